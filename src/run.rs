use crate::field_map::FieldMapping;
use std::collections::{HashMap, HashSet};
use sync_types::supplier::SupplierConfig;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub created: usize,
    pub updated: usize,
    pub republished: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// State of one supplier's import run.
pub struct ImportRunContext {
    pub supplier: SupplierConfig,
    pub mapping: FieldMapping,
    /// Every active supplier by name, the current one included.
    pub active_suppliers: HashMap<String, SupplierConfig>,
    pub counters: RunCounters,
    related_entries: HashSet<Uuid>,
}

impl ImportRunContext {
    pub fn new(
        supplier: SupplierConfig,
        mapping: FieldMapping,
        mut active_suppliers: HashMap<String, SupplierConfig>,
    ) -> Self {
        if supplier.active {
            active_suppliers
                .entry(supplier.name.clone())
                .or_insert_with(|| supplier.clone());
        }
        Self {
            supplier,
            mapping,
            active_suppliers,
            counters: RunCounters::default(),
            related_entries: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.supplier.name
    }

    pub fn is_active(&self, supplier: &str) -> bool {
        self.active_suppliers.contains_key(supplier)
    }

    pub fn touch(&mut self, id: Uuid) {
        self.related_entries.insert(id);
    }

    pub fn touched(&self, id: &Uuid) -> bool {
        self.related_entries.contains(id)
    }

    pub fn report(&self) -> String {
        let c = &self.counters;
        format!(
            "Created: {}, Updated: {}, Republished: {}, Skipped: {}, Deleted: {}, Failed: {}",
            c.created, c.updated, c.republished, c.skipped, c.deleted, c.failed
        )
    }
}
