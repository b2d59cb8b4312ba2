//! Stock aggregate and its events.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Aggregate, EventQueue};
use crate::constants::{
    is_valid_sector, EVENT_STOCK_DELISTED, EVENT_STOCK_LISTED, EVENT_STOCK_RENAMED,
    MAX_COMPANY_NAME_LENGTH, SYMBOL_PATTERN, VALID_SECTORS,
};
use crate::error::{DomainError, DomainResult};
use crate::event::EventPayload;

static SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(SYMBOL_PATTERN).expect("SYMBOL_PATTERN is a valid regex"));

/// Validate and normalise a ticker symbol.
pub fn normalize_symbol(raw: &str) -> DomainResult<String> {
    let symbol = raw.trim().to_ascii_uppercase();
    if SYMBOL_RE.is_match(&symbol) {
        Ok(symbol)
    } else {
        Err(DomainError::validation(format!("invalid ticker symbol '{raw}'")))
    }
}

fn validate_company_name(name: &str) -> DomainResult<()> {
    let name = name.trim();
    if name.is_empty() || name.len() > MAX_COMPANY_NAME_LENGTH {
        return Err(DomainError::validation(format!(
            "company name must be 1-{MAX_COMPANY_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockListed {
    pub stock_id: Uuid,
    pub symbol: String,
    pub name: String,
    pub sector: String,
}

impl EventPayload for StockListed {
    const EVENT_TYPE: &'static str = EVENT_STOCK_LISTED;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRenamed {
    pub symbol: String,
    pub previous_name: String,
    pub name: String,
}

impl EventPayload for StockRenamed {
    const EVENT_TYPE: &'static str = EVENT_STOCK_RENAMED;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDelisted {
    pub symbol: String,
}

impl EventPayload for StockDelisted {
    const EVENT_TYPE: &'static str = EVENT_STOCK_DELISTED;
}

/// A tradable stock, keyed by its ticker symbol
#[derive(Debug, Serialize, Deserialize)]
pub struct Stock {
    pub id: Uuid,
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub listed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: EventQueue,
}

impl Stock {
    /// Admit a new stock and raise [`StockListed`].
    pub fn list(symbol: &str, name: &str, sector: &str) -> DomainResult<Self> {
        let symbol = normalize_symbol(symbol)?;
        validate_company_name(name)?;
        if !is_valid_sector(sector) {
            return Err(DomainError::validation(format!(
                "unknown sector '{sector}', expected one of {}",
                VALID_SECTORS.join(", ")
            )));
        }

        let now = Utc::now();
        let mut stock = Self {
            id: Uuid::new_v4(),
            symbol,
            name: name.trim().to_string(),
            sector: sector.to_string(),
            listed: true,
            created_at: now,
            updated_at: now,
            events: EventQueue::new(),
        };
        let event = StockListed {
            stock_id: stock.id,
            symbol: stock.symbol.clone(),
            name: stock.name.clone(),
            sector: stock.sector.clone(),
        };
        stock.raise(&event)?;
        Ok(stock)
    }

    /// Change the display name; a no-op rename raises nothing.
    pub fn rename(&mut self, name: &str) -> DomainResult<()> {
        self.ensure_listed()?;
        validate_company_name(name)?;
        let name = name.trim();
        if name == self.name {
            return Ok(());
        }

        let previous_name = std::mem::replace(&mut self.name, name.to_string());
        self.updated_at = Utc::now();
        let event = StockRenamed {
            symbol: self.symbol.clone(),
            previous_name,
            name: self.name.clone(),
        };
        self.raise(&event)
    }

    /// Remove the stock from trading.
    pub fn delist(&mut self) -> DomainResult<()> {
        self.ensure_listed()?;
        self.listed = false;
        self.updated_at = Utc::now();
        let event = StockDelisted {
            symbol: self.symbol.clone(),
        };
        self.raise(&event)
    }

    fn ensure_listed(&self) -> DomainResult<()> {
        if self.listed {
            Ok(())
        } else {
            Err(DomainError::invalid_state(format!("{} is delisted", self.symbol)))
        }
    }
}

impl Aggregate for Stock {
    fn aggregate_id(&self) -> String {
        self.symbol.clone()
    }

    fn event_queue(&self) -> &EventQueue {
        &self.events
    }

    fn event_queue_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }
}
