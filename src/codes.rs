//! Payment code generation and normalization
//!
//! Codes are an out-of-band, honor-system proof of payment: staff read the
//! code back from the student and verify it against the order store. The
//! code space (26^3 * 10^4 * 26^3) makes collisions vanishingly unlikely;
//! generation still regenerates on a hit against the in-use set.
use rand::Rng;
use std::collections::HashSet;
use std::fmt;

/// A payment code, normalized to trimmed uppercase. Staff-typed input goes
/// through [`PaymentCode::normalize`] before any lookup.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Hash)]
#[cbor(transparent)]
pub struct PaymentCode(#[n(0)] String);

impl PaymentCode {
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty code never counts as "in use" and never matches an order.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PaymentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a fresh `ABC-1234-XYZ` code from the thread CSPRNG, retrying
/// while it collides with a code currently attached to a live order.
pub fn generate(in_use: &HashSet<PaymentCode>) -> PaymentCode {
    let mut rng = rand::rng();

    loop {
        let mut code = String::with_capacity(12);
        for _ in 0..3 {
            code.push((b'A' + rng.random_range(0..26u8)) as char);
        }
        code.push('-');
        for _ in 0..4 {
            code.push((b'0' + rng.random_range(0..10u8)) as char);
        }
        code.push('-');
        for _ in 0..3 {
            code.push((b'A' + rng.random_range(0..26u8)) as char);
        }

        let code = PaymentCode(code);
        if !in_use.contains(&code) {
            return code;
        }
    }
}
