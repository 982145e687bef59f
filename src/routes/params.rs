use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::entity::OrderStatus;

#[derive(Debug, Default, Clone, Copy, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    /// Page number, default 1
    pub page: Option<i64>,
    /// Items per page, default 20, max 100
    pub per_page: Option<i64>,
}

impl Pagination {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSortBy {
    CreatedAt,
    Price,
    Name,
}

// Query structs repeat `page`/`per_page` instead of flattening `Pagination`:
// serde_urlencoded cannot parse numbers inside flattened structs.
#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    /// Case-insensitive search on name and description
    pub q: Option<String>,
    pub category_id: Option<Uuid>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    #[param(inline)]
    pub sort_by: Option<ProductSortBy>,
    #[param(inline)]
    pub sort_order: Option<SortOrder>,
}

impl ProductQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    #[param(inline)]
    pub status: Option<OrderStatus>,
    #[param(inline)]
    pub sort_order: Option<SortOrder>,
}

impl OrderListQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        assert_eq!(Pagination::default().normalize(), (1, 20, 0));
        assert_eq!(
            Pagination {
                page: Some(0),
                per_page: Some(1000)
            }
            .normalize(),
            (1, 100, 0)
        );
        assert_eq!(
            Pagination {
                page: Some(3),
                per_page: Some(10)
            }
            .normalize(),
            (3, 10, 20)
        );
    }

    #[test]
    fn order_query_parses_status_filter() {
        let query: OrderListQuery = serde_json::from_value(serde_json::json!({
            "page": 2,
            "status": "paid",
            "sort_order": "asc"
        }))
        .unwrap();

        assert_eq!(query.status, Some(OrderStatus::Paid));
        assert_eq!(query.pagination().normalize(), (2, 20, 20));
        assert!(matches!(query.sort_order, Some(SortOrder::Asc)));
    }
}
