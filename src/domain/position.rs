//! Open holdings and closed trades in the cash ledger.

use chrono::NaiveDate;
use std::fmt;

/// Instrument slot in a run: single-asset runs only use `A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leg {
    A,
    B,
}

impl Leg {
    pub fn index(self) -> usize {
        match self {
            Leg::A => 0,
            Leg::B => 1,
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::A => write!(f, "A"),
            Leg::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn of_quantity(quantity: i64) -> Self {
        if quantity >= 0 { Side::Buy } else { Side::Sell }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// One executed order. `quantity` is always positive; `side` carries direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub bar: usize,
    pub date: NaiveDate,
    pub leg: Leg,
    pub code: String,
    pub side: Side,
    pub quantity: i64,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub leg: Leg,
    pub code: String,
    pub exchange: String,
    /// Signed share count: positive long, negative short.
    pub quantity: i64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub entry_bar: usize,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0
    }

    /// Signed value: a short holding is a liability.
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity as f64 * (price - self.entry_price)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub code: String,
    pub exchange: String,
    pub quantity: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub pnl: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_long_position() -> Position {
        Position {
            leg: Leg::A,
            code: "BHP".into(),
            exchange: "ASX".into(),
            quantity: 100,
            entry_price: 50.0,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            entry_bar: 3,
        }
    }

    fn sample_short_position() -> Position {
        Position {
            leg: Leg::A,
            code: "CBA".into(),
            exchange: "ASX".into(),
            quantity: -100,
            entry_price: 100.0,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            entry_bar: 3,
        }
    }

    #[test]
    fn side_follows_quantity_sign() {
        assert_eq!(Side::of_quantity(10), Side::Buy);
        assert_eq!(Side::of_quantity(-10), Side::Sell);
        assert_eq!(Side::Sell.to_string(), "SELL");
        assert_eq!(Leg::B.index(), 1);
    }

    #[test]
    fn is_long_positive_quantity() {
        let pos = sample_long_position();
        assert!(pos.is_long());
        assert!(!pos.is_short());
    }

    #[test]
    fn is_short_negative_quantity() {
        let pos = sample_short_position();
        assert!(pos.is_short());
        assert!(!pos.is_long());
    }

    #[test]
    fn market_value_long() {
        let pos = sample_long_position();
        assert!((pos.market_value(55.0) - 5500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn market_value_short_is_negative() {
        let pos = sample_short_position();
        assert!((pos.market_value(95.0) - (-9500.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn unrealized_pnl_long() {
        let pos = sample_long_position();
        assert!((pos.unrealized_pnl(55.0) - 500.0).abs() < f64::EPSILON);
        assert!((pos.unrealized_pnl(45.0) - (-500.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn unrealized_pnl_short() {
        let pos = sample_short_position();
        assert!((pos.unrealized_pnl(90.0) - 1000.0).abs() < f64::EPSILON);
        assert!((pos.unrealized_pnl(110.0) - (-1000.0)).abs() < f64::EPSILON);
    }
}
