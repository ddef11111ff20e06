use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::voucher::{self, Entity as VoucherEntity, VoucherStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Voucher ledger: availability queries before checkout and usage counting
/// at order creation.
#[derive(Clone)]
pub struct VoucherService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl VoucherService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns every voucher currently applicable to an order of the given
    /// value. Re-queried on each call; results are not cached.
    ///
    /// A voucher qualifies iff it is active, `now` falls within its validity
    /// window, its minimum order value is met, and its usage limit (when
    /// set) is not exhausted.
    #[instrument(skip(self))]
    pub async fn list_available(
        &self,
        order_value: Decimal,
    ) -> Result<Vec<voucher::Model>, ServiceError> {
        let now = Utc::now();

        let vouchers = VoucherEntity::find()
            .filter(voucher::Column::Status.eq(VoucherStatus::Active))
            .filter(voucher::Column::StartsAt.lte(now))
            .filter(voucher::Column::EndsAt.gte(now))
            .filter(voucher::Column::MinOrderValue.lte(order_value))
            .filter(
                Condition::any()
                    .add(voucher::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(voucher::Column::UsedCount)
                            .lt(Expr::col(voucher::Column::UsageLimit)),
                    ),
            )
            .order_by_asc(voucher::Column::EndsAt)
            .all(&*self.db)
            .await?;

        Ok(vouchers)
    }

    /// Marks one use of a voucher: a single atomic increment of
    /// `used_count`, issued at order-creation time for every payment method.
    ///
    /// Silently no-ops when the id does not resolve; the caller validates
    /// voucher choice against `list_available` before checkout. Usage is
    /// never reversed, not even when the order is later cancelled.
    #[instrument(skip(self))]
    pub async fn consume(&self, voucher_id: Uuid) -> Result<(), ServiceError> {
        let result = VoucherEntity::update_many()
            .col_expr(
                voucher::Column::UsedCount,
                Expr::col(voucher::Column::UsedCount).add(1),
            )
            .col_expr(voucher::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(voucher::Column::Id.eq(voucher_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(voucher_id = %voucher_id, "consume called for unknown voucher, ignoring");
            return Ok(());
        }

        info!(voucher_id = %voucher_id, "voucher usage recorded");
        self.event_sender
            .send_or_log(Event::VoucherConsumed(voucher_id))
            .await;
        Ok(())
    }

    /// Looks up a voucher by id.
    pub async fn get(&self, voucher_id: Uuid) -> Result<Option<voucher::Model>, ServiceError> {
        Ok(VoucherEntity::find_by_id(voucher_id).one(&*self.db).await?)
    }
}
