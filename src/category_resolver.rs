use anyhow::anyhow;
use std::sync::Arc;
use sync_types::category::{
    BySlug, Category, CategoryNode, CategoryRepository, CategoryTree, ContainsPolicy, UNCATEGORIZED,
};
use tokio::sync::Mutex;
use typesafe_repository::async_ops::{Save, Select};

/// Canonical category slug of a raw category path.
pub fn resolve_slug<S: AsRef<str>>(
    tree: &CategoryTree,
    policy: ContainsPolicy,
    name: &str,
    path: &[Option<S>],
) -> String {
    tree.descend(path)
        .node()
        .and_then(|node| node_value(node, policy, name))
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| UNCATEGORIZED.to_string())
}

fn node_value(node: &CategoryNode, policy: ContainsPolicy, name: &str) -> Option<String> {
    let name = name.to_lowercase();
    let hit = |keyword: &str| !keyword.is_empty() && name.contains(&keyword.to_lowercase());
    match policy {
        ContainsPolicy::LastRuleDecides => {
            let mut value = node.value.clone();
            for rule in node.contains.iter() {
                value = if hit(&rule.keyword) {
                    Some(rule.value.clone())
                } else {
                    node.value.clone()
                };
            }
            value
        }
        ContainsPolicy::FirstMatch => node
            .contains
            .iter()
            .find(|r| hit(&r.keyword))
            .map(|r| r.value.clone())
            .or_else(|| node.value.clone()),
    }
}

/// Looks resolved slugs up in the category store.
pub struct CategoryResolver {
    repo: Arc<dyn CategoryRepository>,
    uncategorized: Mutex<Option<Category>>,
}

impl CategoryResolver {
    pub fn new(repo: Arc<dyn CategoryRepository>) -> Self {
        Self {
            repo,
            uncategorized: Mutex::new(None),
        }
    }

    pub async fn resolve<S: AsRef<str>>(
        &self,
        tree: &CategoryTree,
        policy: ContainsPolicy,
        name: &str,
        path: &[Option<S>],
    ) -> Result<Category, anyhow::Error> {
        let slug = resolve_slug(tree, policy, name, path);
        if slug != UNCATEGORIZED {
            if let Some(c) = self.by_slug(&slug).await? {
                return Ok(c);
            }
            log::warn!("Category {slug} not found, falling back to {UNCATEGORIZED}");
        }
        self.uncategorized().await
    }

    async fn by_slug(&self, slug: &str) -> Result<Option<Category>, anyhow::Error> {
        Ok(self
            .repo
            .select(&BySlug(slug.to_string()))
            .await?
            .into_iter()
            .next())
    }

    /// The fallback category, created on first use.
    pub async fn uncategorized(&self) -> Result<Category, anyhow::Error> {
        let mut cached = self.uncategorized.lock().await;
        if let Some(c) = cached.as_ref() {
            return Ok(c.clone());
        }
        let category = match self.by_slug(UNCATEGORIZED).await? {
            Some(c) => c,
            None => {
                log::info!("Creating {UNCATEGORIZED} category");
                let c = Category::uncategorized();
                self.repo.save(c.clone()).await?;
                self.by_slug(UNCATEGORIZED)
                    .await?
                    .ok_or_else(|| anyhow!("{UNCATEGORIZED} category missing after creation"))?
            }
        };
        *cached = Some(category.clone());
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryCategoryRepository;
    use sync_types::category::ContainsRule;
    use typesafe_repository::async_ops::List;

    fn tree() -> CategoryTree {
        CategoryTree::new(vec![CategoryNode {
            name: "Δικτυακά".to_string(),
            value: Some("networking".to_string()),
            contains: vec![],
            children: vec![CategoryNode {
                name: "Router".to_string(),
                value: Some("routers".to_string()),
                contains: vec![
                    ContainsRule {
                        keyword: "wifi".to_string(),
                        value: "wifi-routers".to_string(),
                    },
                    ContainsRule {
                        keyword: "lte".to_string(),
                        value: "lte-routers".to_string(),
                    },
                ],
                children: vec![],
            }],
        }])
    }

    #[test]
    fn descends_to_deepest_listed_node() {
        let t = tree();
        let p = ContainsPolicy::LastRuleDecides;
        assert_eq!(resolve_slug(&t, p, "Switch", &[Some("δικτυακά "), Some("Switch"), None]), "networking");
        assert_eq!(resolve_slug(&t, p, "AX3000", &[Some("Δικτυακά"), Some("router"), Some("x")]), "routers");
        assert_eq!(resolve_slug(&t, p, "Laptop", &[Some("Υπολογιστές"), None, None]), UNCATEGORIZED);
        let empty: [Option<&str>; 3] = [None, None, None];
        assert_eq!(resolve_slug(&t, p, "Laptop", &empty), UNCATEGORIZED);
    }

    #[test]
    fn contains_rules_follow_policy() {
        let t = tree();
        let path = [Some("Δικτυακά"), Some("Router"), None];
        // Only the last rule decides under the default policy.
        assert_eq!(
            resolve_slug(&t, ContainsPolicy::LastRuleDecides, "WiFi Router", &path),
            "routers"
        );
        assert_eq!(
            resolve_slug(&t, ContainsPolicy::LastRuleDecides, "LTE Router", &path),
            "lte-routers"
        );
        assert_eq!(
            resolve_slug(&t, ContainsPolicy::FirstMatch, "WiFi LTE Router", &path),
            "wifi-routers"
        );
        assert_eq!(resolve_slug(&t, ContainsPolicy::FirstMatch, "Router", &path), "routers");
    }

    #[tokio::test]
    async fn unknown_slug_falls_back_to_created_uncategorized() {
        let repo = Arc::new(InMemoryCategoryRepository::default());
        repo.save(Category::new("Routers", "routers")).await.unwrap();
        let resolver = CategoryResolver::new(repo.clone());
        let t = tree();
        let path = [Some("Δικτυακά"), Some("Router"), None];

        let c = resolver
            .resolve(&t, ContainsPolicy::LastRuleDecides, "AX3000", &path)
            .await
            .unwrap();
        assert_eq!(c.slug, "routers");

        let path = [Some("Δικτυακά"), None, None];
        let c = resolver
            .resolve(&t, ContainsPolicy::LastRuleDecides, "Switch", &path)
            .await
            .unwrap();
        assert_eq!(c.slug, UNCATEGORIZED);
        resolver.uncategorized().await.unwrap();
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }
}
