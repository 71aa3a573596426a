//! Page capture: turns a live page into a self-contained archived document.
//!
//! A capture works on a detached snapshot of the page. Site hooks and the
//! sanitizer clean it up, every referenced image, font, icon and stylesheet
//! is re-issued as an archive attachment through the [`Resolver`], and the
//! rewritten document is uploaded and finalized in the open transaction.

pub mod capture;
pub mod config;
pub mod fetch;
pub mod hooks;
pub mod page;
pub mod resolver;
pub mod sanitize;
pub mod snapshot;
mod style_attr;
pub mod stylesheet;

pub use crate::capture::CaptureOutcome;
pub use crate::capture::capture;
pub use crate::config::CaptureConfig;
pub use crate::config::HiddenElementPolicy;
pub use crate::fetch::FetchedResource;
pub use crate::fetch::HttpResourceFetcher;
pub use crate::fetch::MemoryFetcher;
pub use crate::fetch::ResourceFetcher;
pub use crate::hooks::SiteHookRegistry;
pub use crate::page::LivePage;
pub use crate::page::LiveStyleSheet;
pub use crate::page::PageLoader;
pub use crate::resolver::AttachmentCache;
pub use crate::resolver::AttachmentRef;
pub use crate::resolver::ResolveError;
pub use crate::resolver::Resolver;
pub use crate::snapshot::Snapshot;
pub use crate::snapshot::build_snapshot;
pub use crate::stylesheet::SheetKey;
pub use crate::stylesheet::StylesheetWalker;
