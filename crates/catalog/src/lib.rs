//! Product catalog and price resolution.
//!
//! Pure reference-data logic: the infra layer loads candidate price rows,
//! this crate decides which one applies.

pub mod currency;
pub mod price;
pub mod product;

pub use currency::{Conversions, Currency, CurrencyRates, round_to_rupiah};
pub use price::{PriceId, PriceQuery, PriceTier, ProductPrice, ResolvedPrice, resolve_price, resolve_price_in_idr};
pub use product::{Product, ProductId, ProductKind};
