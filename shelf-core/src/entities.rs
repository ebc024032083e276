//! Product entity and the change events emitted when it is written.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Identifier assigned by the record store. Strictly increasing, never reused.
pub type ProductId = i64;

/// A catalog product as persisted by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A product that has not been persisted yet and therefore has no id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
}

impl NewProduct {
    /// Build a new product, rejecting a missing or blank name.
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Self, ValidationError> {
        let product = Self {
            name: name.into(),
            description,
        };
        product.validate()?;
        Ok(product)
    }

    /// Check the invariants a product must satisfy before it is persisted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "name".to_string(),
            });
        }
        Ok(())
    }

    /// Attach the id assigned by the store.
    pub fn with_id(self, id: ProductId) -> Product {
        Product {
            id,
            name: self.name,
            description: self.description,
        }
    }
}

/// Kind of change carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    NewEntity,
}

/// Published on the reserved topic after every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub entity: Product,
}

impl ChangeEvent {
    pub fn new_entity(entity: Product) -> Self {
        Self {
            kind: ChangeKind::NewEntity,
            entity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_product_requires_name() {
        let err = NewProduct::new("   ", None).expect_err("blank name should be rejected");
        assert_eq!(
            err,
            ValidationError::RequiredFieldMissing {
                field: "name".to_string()
            }
        );

        let product = NewProduct::new("Laptop Pro", Some("16 inch".to_string()))
            .expect("valid product should be accepted");
        assert_eq!(product.name, "Laptop Pro");
    }

    #[test]
    fn test_with_id_keeps_fields() {
        let product = NewProduct::new("Desk", None)
            .expect("valid product should be accepted")
            .with_id(7);
        assert_eq!(product.id, 7);
        assert_eq!(product.name, "Desk");
        assert_eq!(product.description, None);
    }

    #[test]
    fn test_change_event_wire_format() -> Result<(), serde_json::Error> {
        let event = ChangeEvent::new_entity(Product {
            id: 1,
            name: "Laptop Pro".to_string(),
            description: Some("Fast".to_string()),
        });

        let json = serde_json::to_value(&event)?;
        assert_eq!(json["kind"], "NEW_ENTITY");
        assert_eq!(json["entity"]["id"], 1);
        assert_eq!(json["entity"]["name"], "Laptop Pro");
        assert_eq!(json["entity"]["description"], "Fast");
        Ok(())
    }

    #[test]
    fn test_product_without_description_deserializes() -> Result<(), serde_json::Error> {
        let product: Product = serde_json::from_str(r#"{"id":3,"name":"Lamp"}"#)?;
        assert_eq!(product.description, None);
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_whitespace_names_are_rejected(name in "[ \t\n]{0,8}") {
            prop_assert!(NewProduct::new(name, None).is_err());
        }

        #[test]
        fn prop_names_with_content_are_accepted(name in "[ ]{0,3}[a-zA-Z0-9]{1,16}[ ]{0,3}") {
            prop_assert!(NewProduct::new(name, None).is_ok());
        }
    }
}
