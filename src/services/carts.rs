use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        cart::{self, Entity as CartEntity},
        cart_item::{self, Entity as CartItemEntity},
    },
    errors::ServiceError,
};

/// Cart reconciler: removes purchased line items after checkout and drops
/// the cart row once it is empty.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Removes every cart line whose product is in `product_ids` from the
    /// customer's cart. A missing cart is not an error; the purchase may
    /// have been placed without one.
    #[instrument(skip(self, product_ids), fields(customer_id = %customer_id, product_count = product_ids.len()))]
    pub async fn remove_purchased_items(
        &self,
        customer_id: Uuid,
        product_ids: &[Uuid],
    ) -> Result<(), ServiceError> {
        if product_ids.is_empty() {
            return Ok(());
        }

        let Some(cart) = self.find_cart(customer_id).await? else {
            return Ok(());
        };

        let result = CartItemEntity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.is_in(product_ids.iter().copied()))
            .exec(&*self.db)
            .await?;

        info!(
            customer_id = %customer_id,
            removed = result.rows_affected,
            "purchased items removed from cart"
        );
        Ok(())
    }

    /// Deletes the cart row if no line items remain. Always runs after
    /// `remove_purchased_items` so an emptied cart disappears entirely.
    #[instrument(skip(self))]
    pub async fn delete_if_empty(&self, customer_id: Uuid) -> Result<(), ServiceError> {
        let Some(cart) = self.find_cart(customer_id).await? else {
            return Ok(());
        };

        let remaining = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .count(&*self.db)
            .await?;

        if remaining == 0 {
            CartEntity::delete_by_id(cart.id).exec(&*self.db).await?;
            info!(customer_id = %customer_id, "empty cart deleted");
        }
        Ok(())
    }

    /// Loads the customer's cart line items (used by checkout validation).
    pub async fn items_for_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<cart_item::Model>, ServiceError> {
        let Some(cart) = self.find_cart(customer_id).await? else {
            return Ok(Vec::new());
        };
        Ok(CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&*self.db)
            .await?)
    }

    async fn find_cart(&self, customer_id: Uuid) -> Result<Option<cart::Model>, ServiceError> {
        Ok(CartEntity::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?)
    }
}
