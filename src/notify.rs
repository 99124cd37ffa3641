use crate::config::NotifySettings;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use sync_types::product::Product;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub template_reference_id: String,
    pub to: String,
    pub subject: String,
    pub variables: HashMap<String, String>,
}

/// Delivers templated emails. Rendering and delivery happen outside this crate.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), anyhow::Error>;
}

/// Notifier that only writes messages to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: EmailMessage) -> Result<(), anyhow::Error> {
        log::info!(
            "Notice to {} ({}): {}",
            message.to,
            message.template_reference_id,
            serde_json::to_string(&message.variables)?
        );
        Ok(())
    }
}

/// Back-in-stock notice for `product`, `None` when notices are not configured.
pub fn availability_notice(
    settings: &NotifySettings,
    product: &Product,
    supplier: &str,
) -> Option<EmailMessage> {
    let (Some(template), Some(to)) = (&settings.template_id, &settings.email) else {
        log::debug!("Notices are not configured, skipping {}", product.name);
        return None;
    };
    let mut variables = HashMap::from([
        ("name".to_string(), product.name.clone()),
        ("slug".to_string(), product.slug.clone()),
        ("supplier".to_string(), supplier.to_string()),
        ("price".to_string(), product.price.to_string()),
    ]);
    if let Some(mpn) = &product.mpn {
        variables.insert("mpn".to_string(), mpn.clone());
    }
    Some(EmailMessage {
        template_reference_id: template.clone(),
        to: to.clone(),
        subject: format!("{} is available again", product.name),
        variables,
    })
}
