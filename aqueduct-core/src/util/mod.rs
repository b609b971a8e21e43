pub mod host_url;

pub use host_url::format_host_url;
