use crate::parser::Reading;
use crate::rendemen;

pub const IDENTIFIER_MAX_CHARS: usize = 6;

/// Values shown in the data panel. Fields are kept as display text; the
/// submission path re-parses them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Form {
    pub kartu_ari: String,
    pub pol_baca: String,
    pub brix: String,
    pub pol: String,
    pub rendemen: String,
}

impl Form {
    /// Writes all three readings, then recomputes the yield.
    pub fn apply_reading(&mut self, reading: &Reading) {
        self.pol_baca = format!("{:?}", reading.pol_baca);
        self.brix = format!("{:?}", reading.brix);
        self.pol = format!("{:?}", reading.pol);
        self.recompute_yield();
    }

    /// Clears the yield when brix or pol is missing so a stale value is
    /// never shown.
    pub fn recompute_yield(&mut self) {
        let brix = self.brix.trim().parse::<f64>();
        let pol = self.pol.trim().parse::<f64>();
        self.rendemen = match (brix, pol) {
            (Ok(brix), Ok(pol)) => rendemen::format(rendemen::compute(brix, pol)),
            _ => String::new(),
        };
    }

    /// Returns false when the identifier is already at its length limit.
    pub fn push_identifier_char(&mut self, c: char) -> bool {
        if self.kartu_ari.chars().count() >= IDENTIFIER_MAX_CHARS {
            return false;
        }
        self.kartu_ari.push(c);
        true
    }

    pub fn pop_identifier_char(&mut self) {
        self.kartu_ari.pop();
    }

    pub fn set_identifier(&mut self, value: &str) {
        self.kartu_ari = value.chars().take(IDENTIFIER_MAX_CHARS).collect();
    }

    pub fn has_readings(&self) -> bool {
        !self.brix.is_empty() && !self.pol.is_empty() && !self.pol_baca.is_empty()
    }

    pub fn reset(&mut self) {
        *self = Form::default();
    }
}
