//! Fetching: request pipeline, coalescing and the network boundary.

mod client;
mod coalesce;
mod interceptor;
mod origin;
mod request;
mod transport;

pub use client::{Client, ClientBuilder, Clients};
pub use coalesce::Coalescer;
pub use interceptor::{
  classify, AttachCredentials, CacheLookup, CachePopulate, Intercept, Pipeline, ProxyRewrite,
  RequestStage, ResponseStage,
};
pub use origin::{absolutize, is_same_origin, proxy_url};
pub use request::{Fetched, Method, Payload, PayloadKind, Request, Response};
pub use transport::{HttpTransport, Transport};

#[cfg(test)]
pub(crate) use transport::testing;
