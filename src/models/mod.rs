//! Entity models stored in the price graph, and the payloads exchanged with scrapers.

mod category;
mod city;
mod company;
mod entity;
mod instruction;
mod language;
mod message;
mod page;
mod price;
mod product;

pub use category::Category;
pub use city::City;
pub use company::Company;
pub use entity::{edge_refs, EntityKind, GraphEntity};
pub use instruction::{Instruction, PageInstruction};
pub use language::{validate_language, DEFAULT_LANGUAGE};
pub use message::{ChannelMessage, PriceObservation, ProductObservation};
pub use page::Page;
pub use price::Price;
pub use product::Product;
