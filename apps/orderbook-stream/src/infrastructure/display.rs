//! Console Book Display
//!
//! Prints a price ladder for each rendered book: asks from highest to
//! lowest, then bids from highest to lowest, two decimal places.

use std::fmt::Write as _;
use std::io::Write as _;

use crate::application::ports::BookDisplay;
use crate::domain::order_book::{OrderBook, PriceLevel};

/// [`BookDisplay`] writing to standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleBookDisplay;

impl BookDisplay for ConsoleBookDisplay {
    fn render(&self, book: &OrderBook) {
        let text = render_ladder(book);
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(text.as_bytes()) {
            tracing::debug!(error = %e, "Failed to write order book to stdout");
        }
    }
}

/// Format `book` as a price ladder.
#[must_use]
pub fn render_ladder(book: &OrderBook) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- Order Book for {} ---", book.instrument_id());

    out.push_str("  ASKS:\n");
    for level in book.asks().levels().iter().rev() {
        push_level(&mut out, level);
    }

    out.push_str("  BIDS:\n");
    for level in &book.bids().levels() {
        push_level(&mut out, level);
    }

    out.push_str("-----------------------------\n");
    out
}

fn push_level(out: &mut String, level: &PriceLevel) {
    let _ = writeln!(
        out,
        "    Price: {:.2}, Quantity: {:.2}",
        level.price, level.quantity
    );
}
