//! Domain-level constants.
//!
//! These constants define business rules, validation requirements and the
//! stable type tags of every domain event.

// =============================================================================
// Event type tags
// =============================================================================

/// A new stock was admitted to the registry
pub const EVENT_STOCK_LISTED: &str = "stock.listed";

/// A listed stock changed its display name
pub const EVENT_STOCK_RENAMED: &str = "stock.renamed";

/// A stock was removed from trading
pub const EVENT_STOCK_DELISTED: &str = "stock.delisted";

/// A portfolio was created
pub const EVENT_PORTFOLIO_OPENED: &str = "portfolio.opened";

/// A position was added to (or increased in) a portfolio
pub const EVENT_HOLDING_ADDED: &str = "portfolio.holding_added";

// =============================================================================
// Stocks
// =============================================================================

/// Ticker symbol pattern: leading letter, then letters, digits or a single class suffix
pub const SYMBOL_PATTERN: &str = r"^[A-Z][A-Z0-9]{0,5}(\.[A-Z])?$";

/// Maximum length of a company display name
pub const MAX_COMPANY_NAME_LENGTH: usize = 128;

/// Sectors a stock may be listed under
pub const VALID_SECTORS: &[&str] = &[
    "Technology",
    "Healthcare",
    "Financials",
    "Energy",
    "Industrials",
    "Consumer",
    "Utilities",
    "Materials",
];

/// Check if a sector value is valid
pub fn is_valid_sector(sector: &str) -> bool {
    VALID_SECTORS.contains(&sector)
}

// =============================================================================
// Portfolios
// =============================================================================

/// Maximum length of a portfolio name
pub const MAX_PORTFOLIO_NAME_LENGTH: usize = 64;
