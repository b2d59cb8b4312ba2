//! Portfolio aggregate and its events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Aggregate, EventQueue};
use crate::constants::{EVENT_HOLDING_ADDED, EVENT_PORTFOLIO_OPENED, MAX_PORTFOLIO_NAME_LENGTH};
use crate::error::{DomainError, DomainResult};
use crate::event::EventPayload;
use crate::stock::normalize_symbol;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioOpened {
    pub portfolio_id: Uuid,
    pub name: String,
}

impl EventPayload for PortfolioOpened {
    const EVENT_TYPE: &'static str = EVENT_PORTFOLIO_OPENED;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingAdded {
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub quantity: u64,
    /// Position size after the addition
    pub position: u64,
}

impl EventPayload for HoldingAdded {
    const EVENT_TYPE: &'static str = EVENT_HOLDING_ADDED;
}

/// A named collection of stock positions
#[derive(Debug, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: Uuid,
    pub name: String,
    pub holdings: BTreeMap<String, u64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    events: EventQueue,
}

impl Portfolio {
    /// Create an empty portfolio and raise [`PortfolioOpened`].
    pub fn open(name: &str) -> DomainResult<Self> {
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_PORTFOLIO_NAME_LENGTH {
            return Err(DomainError::validation(format!(
                "portfolio name must be 1-{MAX_PORTFOLIO_NAME_LENGTH} characters"
            )));
        }

        let mut portfolio = Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            holdings: BTreeMap::new(),
            created_at: Utc::now(),
            events: EventQueue::new(),
        };
        let event = PortfolioOpened {
            portfolio_id: portfolio.id,
            name: portfolio.name.clone(),
        };
        portfolio.raise(&event)?;
        Ok(portfolio)
    }

    /// Increase the position in `symbol` by `quantity` shares.
    pub fn add_holding(&mut self, symbol: &str, quantity: u64) -> DomainResult<()> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be greater than 0"));
        }
        let symbol = normalize_symbol(symbol)?;

        let position = self.holdings.entry(symbol.clone()).or_insert(0);
        *position = position
            .checked_add(quantity)
            .ok_or_else(|| DomainError::validation("position size overflow"))?;
        let event = HoldingAdded {
            portfolio_id: self.id,
            symbol,
            quantity,
            position: *position,
        };
        self.raise(&event)
    }

    /// Current position for a symbol (0 when not held)
    pub fn position(&self, symbol: &str) -> u64 {
        self.holdings.get(symbol).copied().unwrap_or(0)
    }
}

impl Aggregate for Portfolio {
    fn aggregate_id(&self) -> String {
        self.id.to_string()
    }

    fn event_queue(&self) -> &EventQueue {
        &self.events
    }

    fn event_queue_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_add_holdings() {
        let mut portfolio = Portfolio::open("Retirement").unwrap();
        portfolio.add_holding("aapl", 10).unwrap();
        portfolio.add_holding("AAPL", 5).unwrap();

        assert_eq!(portfolio.position("AAPL"), 15);
        let events = portfolio.drain_events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type(), EVENT_PORTFOLIO_OPENED);
        let last: HoldingAdded = events[2].payload_as().unwrap();
        assert_eq!(last.position, 15);
        assert!(events.windows(2).all(|w| w[0].sequence() < w[1].sequence()));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut portfolio = Portfolio::open("Growth").unwrap();
        assert!(matches!(
            portfolio.add_holding("AAPL", 0),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(portfolio.pending_events(), 1);
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(Portfolio::open("   ").is_err());
    }
}
