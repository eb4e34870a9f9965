//! Menu bookkeeping around the order core
use crate::error::Result;
use crate::order::TimeStamp;
use crate::utils;
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub price: u64,
    #[n(3)]
    pub image_url: String,
    #[n(4)]
    pub available: bool,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
    #[n(6)]
    pub updated_at: TimeStamp<Utc>,
}

impl MenuItem {
    pub fn new(name: impl Into<String>, price: u64) -> Result<Self> {
        let now = TimeStamp::new();
        Ok(Self {
            id: utils::new_uuid_to_bech32("item_")?,
            name: name.into(),
            price,
            image_url: String::new(),
            available: true,
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

/// The items seeded on first run, matching what a fresh canteen sells.
pub fn default_menu() -> Result<Vec<MenuItem>> {
    Ok(vec![
        MenuItem::new("Samosa", 20)?,
        MenuItem::new("Tea", 12)?,
        MenuItem::new("Veg Puff", 25)?,
        MenuItem::new("Coffee", 18)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_item_encoding() {
        let item = MenuItem::new("Tea", 12).unwrap();

        let encoding = minicbor::to_vec(&item).unwrap();
        let decode: MenuItem = minicbor::decode(&encoding).unwrap();

        assert_eq!(item, decode);
    }

    #[test]
    fn default_menu_is_available() {
        let menu = default_menu().unwrap();
        assert_eq!(menu.len(), 4);
        assert!(menu.iter().all(|it| it.available));
    }
}
