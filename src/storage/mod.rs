//! Cloudflare R2 storage module
//!
//! Two buckets back the two asset realms: a public bucket served through a
//! custom domain, and a private bucket reachable only through signed URLs.

mod object_store;

pub use object_store::{ObjectStore, R2Store};

#[cfg(test)]
pub use object_store::MockObjectStore;

pub(crate) fn build_r2_http_client() -> aws_sdk_s3::config::SharedHttpClient {
    use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;

    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_only()
        .enable_http1()
        .enable_http2()
        .build();

    HyperClientBuilder::new().build(https_connector)
}
