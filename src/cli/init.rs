//! Init command handler.

use color_eyre::Result;

use crate::context::Context;
use crate::di::FromRef;
use crate::repositories::{
    CategoryRepository, CityRepository, CompanyRepository, InstructionRepository,
    PageInstructionRepository, PriceRepository, ProductRepository,
};

use super::App;

impl App {
    /// Declares the schema of every entity kind.
    pub async fn run_init(&self, ctx: &Context) -> Result<()> {
        CompanyRepository::from_ref(ctx).setup().await?;
        CategoryRepository::from_ref(ctx).setup().await?;
        CityRepository::from_ref(ctx).setup().await?;
        InstructionRepository::from_ref(ctx).setup().await?;
        PageInstructionRepository::from_ref(ctx).setup().await?;
        ProductRepository::from_ref(ctx).setup().await?;
        PriceRepository::from_ref(ctx).setup().await?;

        tracing::info!("schema declared for every entity kind");
        Ok(())
    }
}
