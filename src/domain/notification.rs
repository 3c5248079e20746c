use super::ListingItem;

#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub url: Option<String>,
    pub price: String,
    pub location: String,
}

impl Notification {
    pub fn from_listing(item: &ListingItem) -> Self {
        let price = if item.currency.is_empty() {
            item.price.clone()
        } else {
            format!("{} {}", item.price, item.currency)
        };

        Self {
            title: item.title.clone(),
            url: item.url.clone(),
            price,
            location: item.location_label().trim().to_string(),
        }
    }

    /// Format: "{title}\n{price} - {location}\n{url (if any)}"
    pub fn format(&self) -> String {
        let mut message = self.title.clone();

        let details: Vec<&str> = [self.price.as_str(), self.location.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        if !details.is_empty() {
            message.push('\n');
            message.push_str(&details.join(" - "));
        }

        if let Some(url) = &self.url {
            message.push('\n');
            message.push_str(url);
        }

        message
    }
}
