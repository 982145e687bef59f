use std::str::FromStr;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "unpaid")]
    Unpaid,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }

    /// A settled payment can only be re-confirmed; anything else may be retried.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        match self {
            PaymentStatus::Paid => next == PaymentStatus::Paid,
            PaymentStatus::Unpaid | PaymentStatus::Failed => true,
        }
    }

    pub fn transition_to(self, next: PaymentStatus) -> AppResult<PaymentStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::Conflict(format!(
                "Payment cannot move from {} to {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(AppError::BadRequest(format!(
                "Invalid payment status '{other}', expected one of paid, unpaid, failed"
            ))),
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "cc")]
    Cc,
    #[sea_orm(string_value = "debit")]
    Debit,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: PaymentStatus,
    pub amount: i64,
    pub method: PaymentMethod,
    /// Argon2 PHC string of the one-time secret; the plaintext is never stored.
    pub otp_hash: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::orders::Entity",
        from = "Column::OrderId",
        to = "super::orders::Column::Id"
    )]
    Orders,
}

impl Related<super::orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
