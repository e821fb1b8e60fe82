//! Data access layer over the graph store.
//!
//! [`Repository`] is generic over the entity kind and resolves from the
//! [`Context`](crate::context::Context) through `FromRef`. Localization and
//! paginated search extend it in their own modules; [`RelationLinker`]
//! writes edges between kinds.

mod entity;
mod localization;
mod relations;
mod search;

pub use entity::Repository;
pub use relations::{
    Relation, RelationLinker, COMPANY_CATEGORIES, INSTRUCTION_CATEGORIES, INSTRUCTION_CITIES,
    INSTRUCTION_COMPANIES, INSTRUCTION_PAGES, PRICE_CITIES, PRICE_COMPANIES, PRODUCT_CATEGORIES,
    PRODUCT_COMPANIES, PRODUCT_PRICES,
};

use crate::models::{Category, City, Company, Instruction, PageInstruction, Price, Product};

pub type CompanyRepository = Repository<Company>;
pub type CategoryRepository = Repository<Category>;
pub type CityRepository = Repository<City>;
pub type InstructionRepository = Repository<Instruction>;
pub type PageInstructionRepository = Repository<PageInstruction>;
pub type ProductRepository = Repository<Product>;
pub type PriceRepository = Repository<Price>;
