/// Bybit v5 public REST market endpoints (linear USDT perpetuals).
pub mod bybit;
