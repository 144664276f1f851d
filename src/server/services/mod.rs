pub mod app_services;
pub mod intranet_services;
pub mod proxy_client_services;
pub mod retry_context;
pub mod segment_services;
pub mod stream_services;
pub mod token_services;

pub use app_services::AppServices;
pub use intranet_services::{IntranetMapper, SharedIntranetMapper};
pub use proxy_client_services::{NetworkClass, ProxyClient, RetryHooks};
pub use segment_services::DynSegmentService;
pub use stream_services::DynStreamService;
pub use token_services::{DynTokenIssuer, DynTokenService, TokenCache};
