// src/common/scope.rs
//
// Isolamento de tenant. Toda leitura, atualização ou exclusão chega ao Store
// como `ScopedQuery`, e a única forma de obter uma é passar por uma das
// funções de escopo deste módulo. Inserções exigem `OrganizationDefaults` ou
// `BranchDefaults`, que também só nascem aqui.

use uuid::Uuid;

use crate::{
    common::{error::AppError, validation::invalid_field},
    models::tenancy::{ScopeFilter, TenantContext},
};

pub const ORGANIZATION_COLUMN: &str = "organization_id";
pub const BRANCH_COLUMN: &str = "branch_id";

// ---
// Tabelas conhecidas pelo núcleo
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Categories,
    Products,
    Warehouses,
    Customers,
    Suppliers,
    ProductStocks,
    Sales,
    SaleItems,
    PurchaseOrders,
    PurchaseOrderItems,
    StockMovements,
}

/// Como cada tabela é particionada entre tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tenancy {
    Organization,
    Branch,
    /// Organização + (filial do chamador OU compartilhado).
    OrganizationSharedBranch,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Categories => "categories",
            Table::Products => "products",
            Table::Warehouses => "warehouses",
            Table::Customers => "customers",
            Table::Suppliers => "suppliers",
            Table::ProductStocks => "product_stocks",
            Table::Sales => "sales",
            Table::SaleItems => "sale_items",
            Table::PurchaseOrders => "purchase_orders",
            Table::PurchaseOrderItems => "purchase_order_items",
            Table::StockMovements => "stock_movements",
        }
    }

    pub fn tenancy(self) -> Tenancy {
        match self {
            Table::Categories | Table::Products | Table::Customers | Table::Suppliers => {
                Tenancy::Organization
            }
            Table::Warehouses => Tenancy::OrganizationSharedBranch,
            Table::ProductStocks
            | Table::Sales
            | Table::SaleItems
            | Table::PurchaseOrders
            | Table::PurchaseOrderItems
            | Table::StockMovements => Tenancy::Branch,
        }
    }
}

// ---
// Descritor de consulta (imutável: cada builder devolve um novo valor)
// ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(&'static str, Uuid),
    /// `coluna = valor OR coluna IS NULL`
    EqOrNull(&'static str, Uuid),
    In(&'static str, Vec<Uuid>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: Table,
    filters: Vec<Filter>,
    limit: Option<i64>,
    newest_first: bool,
}

impl Query {
    pub fn from(table: Table) -> Self {
        Self { table, filters: Vec::new(), limit: None, newest_first: false }
    }

    pub fn eq(mut self, column: &'static str, value: Uuid) -> Self {
        self.filters.push(Filter::Eq(column, value));
        self
    }

    pub fn by_id(self, id: Uuid) -> Self {
        self.eq("id", id)
    }

    pub fn any_of(mut self, column: &'static str, values: Vec<Uuid>) -> Self {
        self.filters.push(Filter::In(column, values));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub fn table(&self) -> Table {
        self.table
    }

    /// Aplica o filtro explícito das listagens (sempre em AND).
    pub fn narrowed_by(self, filter: &ScopeFilter) -> Self {
        let tenancy = self.table.tenancy();
        let mut query = self;
        if let Some(org) = filter.organization_id {
            if tenancy != Tenancy::Branch {
                query = query.eq(ORGANIZATION_COLUMN, org);
            }
        }
        if let Some(branch) = filter.branch_id {
            if tenancy != Tenancy::Organization {
                query = query.eq(BRANCH_COLUMN, branch);
            }
        }
        query
    }
}

/// Consulta que já passou pelo escopo do tenant. Não há construtor público.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedQuery(Query);

impl ScopedQuery {
    pub fn table(&self) -> Table {
        self.0.table
    }

    pub fn filters(&self) -> &[Filter] {
        &self.0.filters
    }

    pub fn limit(&self) -> Option<i64> {
        self.0.limit
    }

    pub fn is_newest_first(&self) -> bool {
        self.0.newest_first
    }

    /// Restringe ainda mais uma consulta já escopada (só pode estreitar).
    pub fn first(self) -> Self {
        ScopedQuery(self.0.limit(1))
    }
}

// ---
// Filtros (o par de regras de isolamento)
// ---
pub fn apply_organization_filter(query: Query, ctx: &TenantContext) -> Result<ScopedQuery, AppError> {
    apply_organization_filter_on(query, ctx, ORGANIZATION_COLUMN)
}

pub fn apply_organization_filter_on(
    query: Query,
    ctx: &TenantContext,
    column: &'static str,
) -> Result<ScopedQuery, AppError> {
    if ctx.is_super_admin {
        return Ok(ScopedQuery(query));
    }
    let org = require_organization(ctx)?;
    Ok(ScopedQuery(query.eq(column, org)))
}

pub fn apply_branch_filter(query: Query, ctx: &TenantContext) -> Result<ScopedQuery, AppError> {
    apply_branch_filter_on(query, ctx, BRANCH_COLUMN)
}

pub fn apply_branch_filter_on(
    query: Query,
    ctx: &TenantContext,
    column: &'static str,
) -> Result<ScopedQuery, AppError> {
    if ctx.is_super_admin {
        return Ok(ScopedQuery(query));
    }
    let branch = require_branch(ctx)?;
    Ok(ScopedQuery(query.eq(column, branch)))
}

fn require_organization(ctx: &TenantContext) -> Result<Uuid, AppError> {
    ctx.organization_id.ok_or_else(|| {
        AppError::Configuration(format!("usuário {} sem organização vinculada", ctx.user_id))
    })
}

fn require_branch(ctx: &TenantContext) -> Result<Uuid, AppError> {
    ctx.branch_id.ok_or_else(|| {
        AppError::Configuration(format!("usuário {} sem filial vinculada", ctx.user_id))
    })
}

// ---
// Política única por tabela
// ---
pub struct ScopePolicy;

impl ScopePolicy {
    pub fn restrict(query: Query, ctx: &TenantContext) -> Result<ScopedQuery, AppError> {
        match query.table.tenancy() {
            Tenancy::Organization => apply_organization_filter(query, ctx),
            Tenancy::Branch => apply_branch_filter(query, ctx),
            Tenancy::OrganizationSharedBranch => {
                if ctx.is_super_admin {
                    return Ok(ScopedQuery(query));
                }
                let org = require_organization(ctx)?;
                let branch = require_branch(ctx)?;
                let mut query = query.eq(ORGANIZATION_COLUMN, org);
                query.filters.push(Filter::EqOrNull(BRANCH_COLUMN, branch));
                Ok(ScopedQuery(query))
            }
        }
    }
}

// ---
// Valores padrão para linhas novas
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrganizationDefaults {
    organization_id: Uuid,
}

impl OrganizationDefaults {
    pub fn organization_id(&self) -> Uuid {
        self.organization_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchDefaults {
    branch_id: Uuid,
}

impl BranchDefaults {
    pub fn branch_id(&self) -> Uuid {
        self.branch_id
    }
}

pub fn organization_defaults(ctx: &TenantContext) -> Result<OrganizationDefaults, AppError> {
    Ok(OrganizationDefaults { organization_id: require_organization(ctx)? })
}

pub fn branch_defaults(ctx: &TenantContext) -> Result<BranchDefaults, AppError> {
    Ok(BranchDefaults { branch_id: require_branch(ctx)? })
}

/// Filial de destino de uma escrita. O super-admin pode escolher a filial
/// (e precisa informá-la se não tiver uma); os demais só escrevem na própria
/// (outra filial = "não encontrado").
pub fn branch_defaults_for(
    ctx: &TenantContext,
    requested: Option<Uuid>,
) -> Result<BranchDefaults, AppError> {
    match requested {
        Some(branch_id) if ctx.is_super_admin => Ok(BranchDefaults { branch_id }),
        Some(branch_id) if ctx.branch_id != Some(branch_id) => {
            Err(AppError::NotFoundInScope("filial"))
        }
        None if ctx.is_super_admin && ctx.branch_id.is_none() => Err(invalid_field(
            "branchId",
            "missing_branch",
            "Informe a filial de destino.",
        )),
        _ => branch_defaults(ctx),
    }
}
