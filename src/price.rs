use crate::config::PricingDefaults;
use crate::error::ImportError;
use lazy_regex::regex_replace_all;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::str::FromStr;
use sync_types::brand::Brand;
use sync_types::category::Category;
use sync_types::product::{PlatformPrice, Product, SupplierRecord};
use sync_types::supplier::SupplierConfig;
use sync_types::Platform;

/// Parses a price written with European (`1.234,56`), US (`1,234.56`) or
/// single-separator conventions and rounds it to cents.
///
/// With a single kind of separator it is read as a thousands separator when it
/// occurs more than once, or once with exactly three trailing digits after a
/// non-zero integer part. Otherwise it is the decimal separator.
pub fn format_price(s: &str) -> Option<Decimal> {
    let cleaned = regex_replace_all!(r"[^\d.,\-]", s.trim(), "");
    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) => {
            let (thousands, decimal) = if dot > comma { (',', '.') } else { ('.', ',') };
            cleaned.replace(thousands, "").replace(decimal, ".")
        }
        (Some(_), None) => single_separator(&cleaned, '.'),
        (None, Some(_)) => single_separator(&cleaned, ','),
        (None, None) => cleaned.to_string(),
    };
    Decimal::from_str(&normalized).ok().map(money)
}

fn single_separator(s: &str, sep: char) -> String {
    let count = s.matches(sep).count();
    let thousands = count > 1
        || s.split_once(sep).is_some_and(|(int, frac)| {
            frac.len() == 3 && !matches!(int.trim_start_matches('-'), "" | "0")
        });
    if thousands {
        s.replace(sep, "")
    } else {
        s.replace(sep, ".")
    }
}

/// Rounds half away from zero to two decimal places, keeping a scale of two.
pub fn money(d: Decimal) -> Decimal {
    let mut d = d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    d.rescale(2);
    d
}

/// Amount in whole cents, saturating at the `i64` bounds.
pub fn cents(d: Decimal) -> i64 {
    d.checked_mul(Decimal::ONE_HUNDRED)
        .map(|c| c.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|c| c.to_i64())
        .unwrap_or(if d.is_sign_negative() { i64::MIN } else { i64::MAX })
}

pub fn same_amount(a: Decimal, b: Decimal) -> bool {
    cents(a) == cents(b)
}

/// Price of every [`Platform`], in [`Platform::ALL`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSet {
    pub prices: Vec<PlatformPrice>,
}

impl PriceSet {
    fn from_fn(mut f: impl FnMut(Platform) -> PlatformPrice) -> Self {
        Self {
            prices: Platform::ALL.into_iter().map(&mut f).collect(),
        }
    }

    pub fn zero() -> Self {
        Self::from_fn(|platform| PlatformPrice {
            platform,
            price: money(Decimal::ZERO),
            is_fixed: false,
        })
    }

    pub fn get(&self, platform: Platform) -> Option<&PlatformPrice> {
        self.prices.iter().find(|p| p.platform == platform)
    }

    pub fn general(&self) -> Decimal {
        self.get(Platform::General)
            .map(|p| p.price)
            .unwrap_or_default()
    }

    pub fn apply_to(&self, product: &mut Product) {
        for p in self.prices.iter() {
            product.set_platform_price(p.clone());
        }
    }
}

/// Per product context of a price computation.
pub struct PriceInput<'a> {
    pub name: &'a str,
    pub category_slug: &'a str,
    pub brand_name: Option<&'a str>,
    pub recycle_tax: Decimal,
    /// Configurations of the active suppliers, for shipping and retail rules.
    pub suppliers: &'a HashMap<String, SupplierConfig>,
}

#[derive(Debug, Clone)]
pub struct PriceEngine {
    defaults: PricingDefaults,
}

impl PriceEngine {
    pub fn new(defaults: PricingDefaults) -> Self {
        Self { defaults }
    }

    pub fn compute_price(
        &self,
        existing: Option<&Product>,
        supplier_records: &[SupplierRecord],
        category: Option<&Category>,
        brand: Option<&Brand>,
        input: &PriceInput,
    ) -> Result<PriceSet, ImportError> {
        if let Some(p) = existing.filter(|p| p.inventory > 0) {
            return Ok(PriceSet::from_fn(|platform| PlatformPrice {
                is_fixed: true,
                ..p.platform_price(platform)
            }));
        }
        let winner = match existing {
            None => supplier_records.iter().min_by_key(|r| r.wholesale),
            Some(p) => {
                let in_stock = supplier_records.iter().filter(|r| r.in_stock).min_by_key(|r| r.wholesale);
                if in_stock.is_none() {
                    return Ok(PriceSet::from_fn(|platform| p.platform_price(platform)));
                }
                in_stock
            }
        };
        let Some(winner) = winner else {
            return Ok(PriceSet::zero());
        };
        let supplier = input.suppliers.get(&winner.name);
        let shipping = supplier.map(|s| s.shipping).unwrap_or_default();
        let minimums = self.calculate_prices(winner, shipping, input.recycle_tax, category, brand, input.name)?;
        let suggested = winner
            .retail_price
            .filter(|r| !r.is_zero())
            .filter(|_| {
                supplier.is_some_and(|s| s.retail.applies(input.brand_name, input.category_slug, input.name))
            });
        Ok(PriceSet {
            prices: minimums
                .into_iter()
                .map(|(platform, min)| match existing {
                    None => determine_new_product_price(platform, min, suggested),
                    Some(p) => update_prices(&p.platform_price(platform), min, suggested),
                })
                .collect(),
        })
    }

    /// Minimum selling price of every platform derived from the supplier's wholesale.
    pub fn calculate_prices(
        &self,
        record: &SupplierRecord,
        shipping: Decimal,
        recycle_tax: Decimal,
        category: Option<&Category>,
        brand: Option<&Brand>,
        product: &str,
    ) -> Result<Vec<(Platform, Decimal)>, ImportError> {
        if record.wholesale.is_sign_negative() {
            return Err(ImportError::price(
                product,
                format!("negative wholesale {} from {}", record.wholesale, record.name),
            ));
        }
        let hundred = Decimal::ONE_HUNDRED;
        Platform::ALL
            .into_iter()
            .map(|platform| {
                let defaults = self.defaults.platform(platform);
                let own = category.and_then(|c| c.percentages.get(&platform));
                let general = category.and_then(|c| c.percentages.get(&Platform::General));
                let percentage = brand
                    .and_then(|b| b.percentages.get(&platform).copied())
                    .or_else(|| own.and_then(|p| p.percentage))
                    .or_else(|| general.and_then(|p| p.percentage))
                    .unwrap_or(defaults.percentage);
                let addon = own
                    .and_then(|p| p.addon)
                    .or_else(|| general.and_then(|p| p.addon))
                    .unwrap_or(defaults.addon);
                if percentage <= -hundred {
                    return Err(ImportError::price(
                        product,
                        format!("{platform} percentage {percentage} leaves no price"),
                    ));
                }
                let price = record
                    .wholesale
                    .checked_add(recycle_tax)
                    .and_then(|b| b.checked_add(addon))
                    .and_then(|b| b.checked_add(shipping))
                    .zip(Decimal::ONE.checked_add(self.defaults.tax_rate / hundred))
                    .and_then(|(b, vat)| b.checked_mul(vat))
                    .zip(Decimal::ONE.checked_add(percentage / hundred))
                    .and_then(|(b, markup)| b.checked_mul(markup))
                    .ok_or_else(|| {
                        ImportError::price(
                            product,
                            format!("{platform} price from {} is out of range", record.name),
                        )
                    })?;
                Ok((platform, money(price)))
            })
            .collect()
    }
}

/// Price of a product that has no stored price yet.
pub fn determine_new_product_price(
    platform: Platform,
    min: Decimal,
    suggested: Option<Decimal>,
) -> PlatformPrice {
    let price = match suggested {
        Some(s) if cents(s) > cents(min) => s,
        _ => min,
    };
    PlatformPrice {
        platform,
        price: money(price),
        is_fixed: false,
    }
}

/// Re-prices a stored platform price against a new minimum and suggested price.
///
/// A fixed price is only ever raised to the minimum; otherwise the suggested
/// price is adopted when it exceeds the minimum, falling back to the minimum.
pub fn update_prices(existing: &PlatformPrice, min: Decimal, suggested: Option<Decimal>) -> PlatformPrice {
    if existing.is_fixed {
        if cents(existing.price) >= cents(min) {
            return existing.clone();
        }
        return PlatformPrice {
            price: money(min),
            ..existing.clone()
        };
    }
    let target = match suggested {
        Some(s) if cents(s) > cents(min) => s,
        _ => min,
    };
    if same_amount(target, existing.price) {
        return existing.clone();
    }
    PlatformPrice {
        platform: existing.platform,
        price: money(target),
        is_fixed: false,
    }
}
