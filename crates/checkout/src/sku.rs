//! Line-item SKU codec.
//!
//! The payment provider does not carry structured metadata per line
//! item, so each line's `{bookId, duration, referCode, couponCode}` is
//! packed into the item's SKU string and decoded back out of the
//! provider's response at confirmation time. Fields are joined with
//! underscores, which do not occur in ids, duration tokens, or codes.

use common::{BookId, BorrowDuration};

/// Decoded per-line metadata carried through the provider round trip.
///
/// Empty `refer_code` and `coupon_code` mean the line carried none.
#[derive(Debug, Clone, PartialEq)]
pub struct Sku {
    pub book_id: BookId,
    pub duration: BorrowDuration,
    pub refer_code: String,
    pub coupon_code: String,
}

impl Sku {
    pub fn new(
        book_id: BookId,
        duration: BorrowDuration,
        refer_code: impl Into<String>,
        coupon_code: impl Into<String>,
    ) -> Self {
        Self {
            book_id,
            duration,
            refer_code: refer_code.into(),
            coupon_code: coupon_code.into(),
        }
    }

    /// Decodes a packed SKU. Returns `None` for anything that does not
    /// split into exactly four well-formed fields; confirmation skips
    /// such lines rather than failing the whole payment.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split('_');
        let book_id = parts.next()?.parse().ok()?;
        let duration = parts.next()?.parse().ok()?;
        let refer_code = parts.next()?.to_string();
        let coupon_code = parts.next()?.to_string();
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            book_id,
            duration,
            refer_code,
            coupon_code,
        })
    }
}

impl std::fmt::Display for Sku {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.book_id, self.duration, self.refer_code, self.coupon_code
        )
    }
}
