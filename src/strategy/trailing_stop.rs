use crate::models::Direction;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    #[error("trailing stop already tracking a position entered at {entry_price}")]
    AlreadyOpen { entry_price: Decimal },
    #[error("trailing stop has no open position")]
    NotOpen,
    #[error("price must be positive, got {0}")]
    InvalidPrice(Decimal),
    #[error("trailing stop percent must be between 0 and 100, got {0}")]
    InvalidPercent(Decimal),
}

/// Snapshot of what the tracker is following
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingStopState {
    /// `None` while flat
    pub position: Option<Direction>,
    pub entry_price: Decimal,
    /// Highest price seen for LONG, lowest for SHORT
    pub extreme_price: Decimal,
    pub trailing_stop_percent: Decimal,
}

/// Trailing stop for a single position
///
/// FLAT -> OPEN on `initialize`, back to FLAT on `reset`. The extreme price only
/// ratchets in the position's favor.
#[derive(Debug, Clone)]
pub struct TrailingStopTracker {
    state: TrailingStopState,
}

impl TrailingStopTracker {
    pub fn new(trailing_stop_percent: Decimal) -> Result<Self, TrackerError> {
        if trailing_stop_percent <= Decimal::ZERO || trailing_stop_percent >= Decimal::ONE_HUNDRED {
            return Err(TrackerError::InvalidPercent(trailing_stop_percent));
        }

        Ok(Self {
            state: TrailingStopState {
                position: None,
                entry_price: Decimal::ZERO,
                extreme_price: Decimal::ZERO,
                trailing_stop_percent,
            },
        })
    }

    pub fn state(&self) -> &TrailingStopState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.position.is_some()
    }

    pub fn position(&self) -> Option<Direction> {
        self.state.position
    }

    pub fn trailing_stop_percent(&self) -> Decimal {
        self.state.trailing_stop_percent
    }

    /// Start tracking a freshly entered position
    ///
    /// Rejected while a position is already tracked.
    pub fn initialize(&mut self, direction: Direction, entry_price: Decimal) -> Result<(), TrackerError> {
        if self.is_open() {
            return Err(TrackerError::AlreadyOpen {
                entry_price: self.state.entry_price,
            });
        }
        if entry_price <= Decimal::ZERO {
            return Err(TrackerError::InvalidPrice(entry_price));
        }

        self.state.position = Some(direction);
        self.state.entry_price = entry_price;
        self.state.extreme_price = entry_price;

        tracing::debug!(%direction, %entry_price, "Trailing stop initialized");
        Ok(())
    }

    /// Ratchet the extreme price toward `current_price`
    pub fn update(&mut self, current_price: Decimal) -> Result<(), TrackerError> {
        let direction = self.state.position.ok_or(TrackerError::NotOpen)?;

        let improved = match direction {
            Direction::Long => current_price > self.state.extreme_price,
            Direction::Short => current_price < self.state.extreme_price,
        };
        if improved {
            self.state.extreme_price = current_price;
            tracing::debug!(%direction, extreme = %current_price, "Trailing stop ratcheted");
        }

        Ok(())
    }

    /// Current stop level, `None` while flat
    pub fn stop_price(&self) -> Option<Decimal> {
        let fraction = self.state.trailing_stop_percent / Decimal::ONE_HUNDRED;
        self.state.position.map(|direction| match direction {
            Direction::Long => self.state.extreme_price * (Decimal::ONE - fraction),
            Direction::Short => self.state.extreme_price * (Decimal::ONE + fraction),
        })
    }

    /// Whether `current_price` has crossed the stop; always false while flat
    pub fn check_trigger(&self, current_price: Decimal) -> bool {
        match (self.state.position, self.stop_price()) {
            (Some(Direction::Long), Some(stop)) => current_price <= stop,
            (Some(Direction::Short), Some(stop)) => current_price >= stop,
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.state.position = None;
        self.state.entry_price = Decimal::ZERO;
        self.state.extreme_price = Decimal::ZERO;
    }
}
