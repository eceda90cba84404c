//! Identity lookups for the entities purchasing documents point at.
//!
//! The `require_*` functions resolve an id or fail with [`Error::NotFound`];
//! inactive rows count as missing. The `create_*` functions are the minimal
//! write side used when seeding data.

use crate::{
    entities::{Product, Supplier, User, Warehouse, product, supplier, user, warehouse},
    errors::{Error, Result},
};
use sea_orm::{Set, prelude::*};

/// Resolves an active supplier.
pub async fn require_supplier<C>(db: &C, supplier_id: i64) -> Result<supplier::Model>
where
    C: ConnectionTrait,
{
    Supplier::find_by_id(supplier_id)
        .one(db)
        .await?
        .filter(|s| s.is_active)
        .ok_or(Error::NotFound {
            entity: "Supplier",
            id: supplier_id,
        })
}

/// Resolves an active warehouse.
pub async fn require_warehouse<C>(db: &C, warehouse_id: i64) -> Result<warehouse::Model>
where
    C: ConnectionTrait,
{
    Warehouse::find_by_id(warehouse_id)
        .one(db)
        .await?
        .filter(|w| w.is_active)
        .ok_or(Error::NotFound {
            entity: "Warehouse",
            id: warehouse_id,
        })
}

/// Resolves an active product.
pub async fn require_product<C>(db: &C, product_id: i64) -> Result<product::Model>
where
    C: ConnectionTrait,
{
    Product::find_by_id(product_id)
        .one(db)
        .await?
        .filter(|p| p.is_active)
        .ok_or(Error::NotFound {
            entity: "Product",
            id: product_id,
        })
}

/// Resolves a user.
pub async fn require_user<C>(db: &C, user_id: i64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "User",
            id: user_id,
        })
}

/// Resolves the acting user when one is given.
pub async fn resolve_actor<C>(db: &C, acting_user: Option<i64>) -> Result<Option<i64>>
where
    C: ConnectionTrait,
{
    match acting_user {
        Some(id) => Ok(Some(require_user(db, id).await?.id)),
        None => Ok(None),
    }
}

/// Creates a supplier, trimming and validating its name.
pub async fn create_supplier<C>(
    db: &C,
    name: &str,
    email: Option<String>,
) -> Result<supplier::Model>
where
    C: ConnectionTrait,
{
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("supplier name cannot be empty"));
    }

    let supplier = supplier::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email),
        is_active: Set(true),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    Ok(supplier.insert(db).await?)
}

/// Creates a warehouse.
pub async fn create_warehouse<C>(db: &C, name: &str, code: &str) -> Result<warehouse::Model>
where
    C: ConnectionTrait,
{
    if name.trim().is_empty() || code.trim().is_empty() {
        return Err(Error::validation("warehouse name and code are required"));
    }

    let warehouse = warehouse::ActiveModel {
        name: Set(name.trim().to_string()),
        code: Set(code.trim().to_string()),
        is_active: Set(true),
        ..Default::default()
    };
    Ok(warehouse.insert(db).await?)
}

/// Creates a product.
pub async fn create_product<C>(db: &C, name: &str, sku: &str) -> Result<product::Model>
where
    C: ConnectionTrait,
{
    if name.trim().is_empty() || sku.trim().is_empty() {
        return Err(Error::validation("product name and sku are required"));
    }

    let product = product::ActiveModel {
        name: Set(name.trim().to_string()),
        sku: Set(sku.trim().to_string()),
        is_active: Set(true),
        ..Default::default()
    };
    Ok(product.insert(db).await?)
}

/// Creates a user.
pub async fn create_user<C>(db: &C, name: &str) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    let user = user::ActiveModel {
        name: Set(name.trim().to_string()),
        ..Default::default()
    };
    Ok(user.insert(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_create_supplier_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result = create_supplier(&db, "   ", None).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_require_missing_entities() -> Result<()> {
        let db = setup_test_db().await?;

        assert!(matches!(
            require_supplier(&db, 42).await,
            Err(Error::NotFound { entity: "Supplier", id: 42 })
        ));
        assert!(matches!(
            require_warehouse(&db, 42).await,
            Err(Error::NotFound { entity: "Warehouse", .. })
        ));
        assert!(matches!(
            require_product(&db, 42).await,
            Err(Error::NotFound { entity: "Product", .. })
        ));
        assert!(matches!(
            resolve_actor(&db, Some(42)).await,
            Err(Error::NotFound { entity: "User", .. })
        ));
        assert_eq!(resolve_actor(&db, None).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_inactive_supplier_is_not_found() -> Result<()> {
        let db = setup_test_db().await?;
        let supplier = create_supplier(&db, "Acme Parts", None).await?;
        assert_eq!(require_supplier(&db, supplier.id).await?.name, "Acme Parts");

        let mut active: supplier::ActiveModel = supplier.clone().into();
        active.is_active = Set(false);
        active.update(&db).await?;

        assert!(matches!(
            require_supplier(&db, supplier.id).await,
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }
}
