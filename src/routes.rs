// src/routes.rs

use axum::{
    routing::{delete, get, patch, put},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{config::AppState, docs::ApiDoc, handlers};

pub fn build_router(app_state: AppState) -> Router {
    // Todas exigem o JWT (via extrator TenantContext)
    let sales_routes = Router::new()
        .route("/"
               ,get(handlers::sales::list_sales)
               .post(handlers::sales::create_sale)
        )
        .route("/{id}"
               ,get(handlers::sales::get_sale)
               .patch(handlers::sales::update_sale)
               .delete(handlers::sales::delete_sale)
        );

    let purchase_routes = Router::new()
        .route("/"
               ,get(handlers::purchases::list_purchase_orders)
               .post(handlers::purchases::create_purchase_order)
        )
        .route("/{id}"
               ,get(handlers::purchases::get_purchase_order)
               .delete(handlers::purchases::delete_purchase_order)
        )
        .route("/{id}/items/{item_id}"
               ,patch(handlers::purchases::update_purchase_item)
               .delete(handlers::purchases::delete_purchase_item)
        );

    let movement_routes = Router::new()
        .route("/"
               ,get(handlers::movements::list_movements)
               .post(handlers::movements::create_movement)
        )
        .route("/{id}"
               ,put(handlers::movements::update_movement)
               .delete(handlers::movements::delete_movement)
        );

    let stock_routes = Router::new()
        .route("/"
               ,get(handlers::stock::list_stock_levels)
               .put(handlers::stock::set_stock_level)
        )
        .route("/{id}", delete(handlers::stock::delete_stock_level));

    let warehouse_routes = Router::new()
        .route("/valuation", get(handlers::stock::list_valuations))
        .route("/{id}/valuation", get(handlers::stock::get_valuation))
        .route("/{id}", delete(handlers::catalog::delete_warehouse));

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/me/context", get(handlers::context::get_context))
        .nest("/api/sales", sales_routes)
        .nest("/api/purchase-orders", purchase_routes)
        .nest("/api/stock-movements", movement_routes)
        .nest("/api/stock-levels", stock_routes)
        .nest("/api/warehouses", warehouse_routes)
        .route("/api/categories/{id}", delete(handlers::catalog::delete_category))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state)
}
