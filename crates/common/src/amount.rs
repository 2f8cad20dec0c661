//! Aritmetika nilai token dengan presisi desimal tetap.
//!
//! Nilai token adalah desimal dengan maksimum 10 digit pecahan. Setiap hasil
//! pengurangan WAJIB dibulatkan kembali ke 10 digit supaya akumulasi error
//! biner float tidak menggeser perbandingan `remaining == 0`.

/// Jumlah digit pecahan untuk semua nilai token.
pub const TOKEN_DECIMAL_PLACES: u32 = 10;

/// Membulatkan `v` ke `places` digit desimal (round half away from zero).
#[must_use]
pub fn round_places(v: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (v * factor).round() / factor
}

/// Membulatkan nilai token ke [`TOKEN_DECIMAL_PLACES`] digit.
#[must_use]
pub fn round_token_amount(v: f64) -> f64 {
    round_places(v, TOKEN_DECIMAL_PLACES)
}
