//! Catalog read models.
//!
//! Products and categories are owned by catalog management; the storefront
//! only reads them. Prices are stored as integer minor units and exposed as
//! decimals in API payloads.

use quiosque_core::{CategoryId, OrgId, Price, ProductId};
use serde::Serialize;

/// A purchasable product, as read from the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub org_id: OrgId,
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub description: String,
    #[serde(serialize_with = "as_decimal")]
    pub price: Price,
    #[serde(serialize_with = "as_optional_decimal")]
    pub discount_price: Option<Price>,
    pub image_url: Option<String>,
    pub is_promotion: bool,
    pub is_combo: bool,
}

impl Product {
    /// The price charged at add-to-cart time: the discounted price when one
    /// is set, the list price otherwise.
    #[must_use]
    pub fn effective_price(&self) -> Price {
        self.discount_price.unwrap_or(self.price)
    }
}

/// A menu category.
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub org_id: OrgId,
    pub name: String,
    pub position: i32,
}

/// Optional filters for catalog listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CatalogFilters {
    /// Case-insensitive substring match on name/description.
    pub query: Option<String>,
    pub is_promotion: Option<bool>,
    pub is_combo: Option<bool>,
    pub category_id: Option<CategoryId>,
}

/// The catalog listing returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogView {
    pub categories: Vec<Category>,
    pub products: Vec<Product>,
}

fn as_decimal<S: serde::Serializer>(price: &Price, serializer: S) -> Result<S::Ok, S::Error> {
    serde::Serialize::serialize(&price.to_decimal(), serializer)
}

fn as_optional_decimal<S: serde::Serializer>(
    price: &Option<Price>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    price.map(|p| p.to_decimal()).serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_price_prefers_discount() {
        let mut product = Product {
            id: ProductId::generate(),
            org_id: OrgId::parse("foodtruck").expect("valid slug"),
            category_id: None,
            name: "Dogão Clássico".to_owned(),
            description: String::new(),
            price: Price::from_minor_units(1500),
            discount_price: None,
            image_url: None,
            is_promotion: false,
            is_combo: false,
        };
        assert_eq!(product.effective_price().minor_units(), 1500);

        product.discount_price = Some(Price::from_minor_units(1200));
        assert_eq!(product.effective_price().minor_units(), 1200);
    }

    #[test]
    fn test_price_serializes_as_decimal() {
        let product = Product {
            id: ProductId::generate(),
            org_id: OrgId::parse("foodtruck").expect("valid slug"),
            category_id: None,
            name: "Coca-Cola".to_owned(),
            description: String::new(),
            price: Price::from_minor_units(650),
            discount_price: None,
            image_url: None,
            is_promotion: false,
            is_combo: false,
        };
        let json = serde_json::to_value(&product).expect("serialize");
        assert_eq!(json["price"], serde_json::json!("6.50"));
    }
}
