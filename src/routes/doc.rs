use utoipa::{
    Modify, OpenApi,
    openapi::{
        self, OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{AddToCartRequest, CartItemDto, CartView},
        categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
        orders::{CheckoutRequest, CheckoutResponse, OrderList, OrderWithItems, UpdateOrderStatusRequest},
        payments::PaymentConfirmed,
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
        users::{ChangePasswordRequest, UpdateUserRequest},
    },
    entity::{OrderStatus, PaymentMethod, PaymentStatus},
    models::{Cart, Category, Order, OrderItem, Payment, Product, User},
    response::{ErrorBody, Meta, ResponseStatus},
    routes::{admin, auth, cart, health, orders, params, products, users, webhook},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        users::me,
        users::update_me,
        users::change_password,
        products::list_products,
        products::get_product,
        products::list_categories,
        cart::get_cart,
        cart::add_to_cart,
        cart::get_cart_item,
        cart::remove_cart_item,
        orders::list_orders,
        orders::checkout,
        orders::get_order,
        webhook::payment_webhook,
        admin::create_product,
        admin::update_product,
        admin::delete_product,
        admin::create_category,
        admin::update_category,
        admin::delete_category,
        admin::update_order_status
    ),
    components(
        schemas(
            User,
            Category,
            Product,
            Cart,
            Order,
            OrderItem,
            Payment,
            OrderStatus,
            PaymentStatus,
            PaymentMethod,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UpdateUserRequest,
            ChangePasswordRequest,
            AddToCartRequest,
            CartItemDto,
            CartView,
            CheckoutRequest,
            CheckoutResponse,
            OrderList,
            OrderWithItems,
            UpdateOrderStatusRequest,
            PaymentConfirmed,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryList,
            params::Pagination,
            params::SortOrder,
            params::ProductSortBy,
            Meta,
            ResponseStatus,
            ErrorBody
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration and login"),
        (name = "User", description = "Current user profile"),
        (name = "Products", description = "Catalog browsing"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Checkout and order history"),
        (name = "Webhook", description = "Payment gateway callback"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
