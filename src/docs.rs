// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Contexto ---
        handlers::context::get_context,

        // --- Vendas ---
        handlers::sales::create_sale,
        handlers::sales::list_sales,
        handlers::sales::get_sale,
        handlers::sales::update_sale,
        handlers::sales::delete_sale,

        // --- Compras ---
        handlers::purchases::create_purchase_order,
        handlers::purchases::list_purchase_orders,
        handlers::purchases::get_purchase_order,
        handlers::purchases::delete_purchase_order,
        handlers::purchases::update_purchase_item,
        handlers::purchases::delete_purchase_item,

        // --- Movimentações ---
        handlers::movements::create_movement,
        handlers::movements::list_movements,
        handlers::movements::update_movement,
        handlers::movements::delete_movement,

        // --- Estoque ---
        handlers::stock::list_stock_levels,
        handlers::stock::set_stock_level,
        handlers::stock::delete_stock_level,
        handlers::stock::list_valuations,
        handlers::stock::get_valuation,

        // --- Cadastros ---
        handlers::catalog::delete_category,
        handlers::catalog::delete_warehouse,
    ),
    components(
        schemas(
            // --- Tenancy ---
            models::tenancy::TenantContext,
            models::tenancy::Organization,
            models::tenancy::Branch,

            // --- Catálogo ---
            models::catalog::Category,
            models::catalog::Product,
            models::catalog::Warehouse,
            models::catalog::Party,

            // --- Vendas ---
            models::sales::Sale,
            models::sales::SaleItem,
            models::sales::SaleDetail,
            models::sales::SaleItemInput,
            models::sales::CreateSaleInput,
            models::sales::UpdateSaleInput,

            // --- Compras ---
            models::purchasing::PurchaseOrder,
            models::purchasing::PurchaseOrderItem,
            models::purchasing::PurchaseOrderDetail,
            models::purchasing::PurchaseItemInput,
            models::purchasing::CreatePurchaseOrderInput,
            models::purchasing::UpdatePurchaseItemInput,

            // --- Estoque ---
            models::inventory::ProductStock,
            models::inventory::SetStockLevelInput,
            models::inventory::StockMovement,
            models::inventory::WarehouseSelection,
            models::inventory::MovementInput,
            models::inventory::WarehouseValuation,
        )
    ),
    tags(
        (name = "Contexto", description = "Escopo do usuário autenticado"),
        (name = "Vendas", description = "Vendas com baixa de estoque"),
        (name = "Compras", description = "Pedidos de compra com entrada de estoque"),
        (name = "Movimentações", description = "Entradas, saídas e transferências"),
        (name = "Estoque", description = "Saldos e valorização por armazém"),
        (name = "Cadastros", description = "Exclusões protegidas por dependentes")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
