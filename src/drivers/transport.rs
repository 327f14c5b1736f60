//! TCP stream connector

use futures::future::BoxFuture;
use futures::FutureExt;
use std::io;
use tokio::net::TcpStream;
use tracing::debug;

use super::{BoxedStream, Connector};

/// Plain TCP connector with Nagle's algorithm disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for TcpConnector {
    fn connect<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, io::Result<BoxedStream>> {
        async move {
            let stream = TcpStream::connect(endpoint).await?;
            // Frames are written as prefix + payload; don't let the prefix sit in a buffer
            stream.set_nodelay(true)?;
            debug!(
                local = %stream.local_addr()?,
                peer = %stream.peer_addr()?,
                "TCP stream established"
            );
            Ok(Box::new(stream) as BoxedStream)
        }
        .boxed()
    }
}
