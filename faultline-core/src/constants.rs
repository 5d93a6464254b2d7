use std::sync::LazyLock;

use crate::protocol::ClientSdkInfo;

/// The version of this SDK.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) const USER_AGENT: &str = concat!("faultline-rust/", env!("CARGO_PKG_VERSION"));

pub(crate) static SDK_INFO: LazyLock<ClientSdkInfo> = LazyLock::new(|| ClientSdkInfo {
    name: "faultline.rust".into(),
    version: VERSION.into(),
    integrations: vec![],
});
