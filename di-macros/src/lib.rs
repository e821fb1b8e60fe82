//! Compile-time dependency injection macros for pricegraph.
//!
//! - `#[derive(Context)]` makes each field of the root context resolvable
//! - `#[derive(FromContext)]` builds a repository or service from the context
//!
//! Generated code refers to `crate::FromRef`, so the consuming crate must
//! define or re-export that trait at its root.

use proc_macro::TokenStream;

mod context;
mod from_context;

/// Generates `impl FromRef<Ctx> for FieldType` for every field of `Ctx`.
///
/// Fields must be `Clone` and their types distinct. Mark a field
/// `#[context(skip)]` to leave it out.
///
/// ```ignore
/// #[derive(Context, Clone)]
/// pub struct Context {
///     pub store: Arc<dyn GraphStore>,
///     pub broker: Arc<dyn MessageBroker>,
///     #[context(skip)]
///     pub started_at: Instant,
/// }
/// ```
#[proc_macro_derive(Context, attributes(context))]
pub fn derive_context(input: TokenStream) -> TokenStream {
    context::derive_context_impl(input)
}

/// Generates `impl FromRef<Context> for Self`, resolving every field through
/// `FromRef`.
///
/// `#[from_context(Context = MyContext)]` on the struct selects another
/// context type. `#[from_context(default)]` on a field fills it with
/// `Default::default()`.
///
/// ```ignore
/// #[derive(FromContext, Clone)]
/// pub struct Reconciler {
///     products: ProductRepository,
///     store: Arc<dyn GraphStore>,
/// }
///
/// #[derive(FromContext)]
/// pub struct Repository<E> {
///     store: Arc<dyn GraphStore>,
///     #[from_context(default)]
///     kind: PhantomData<fn() -> E>,
/// }
/// ```
#[proc_macro_derive(FromContext, attributes(from_context))]
pub fn derive_from_context(input: TokenStream) -> TokenStream {
    from_context::derive_from_context_impl(input)
}
