// Copyright 2023 litep2p developers
// Copyright 2026 reachnet developers
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Stream multiplexing is an external collaborator (see
//! [`crate::security`] for the equally-external secure channel). A
//! [`Muxer`] turns one secured connection into many independent byte
//! streams; the concrete multiplexing protocol is supplied by the embedder.

use crate::security::SecureConnection;

use async_trait::async_trait;

#[async_trait]
pub trait Muxer: Send + Sync {
    async fn open_stream(&self) -> crate::Result<Box<SecureConnection>>;

    async fn accept_stream(&self) -> crate::Result<Box<SecureConnection>>;

    async fn close(&self);
}

#[async_trait]
pub trait MuxerFactory: Send + Sync {
    /// `server = true` for the inbound (accept) side.
    async fn new_muxer(&self, secure: Box<SecureConnection>, server: bool) -> crate::Result<Box<dyn Muxer>>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    //! A single-stream "multiplexer" for tests: the first `open_stream`
    //! returns the whole underlying connection, every later call errors.
    //! Sufficient to exercise the dial/accept engine's bookkeeping without
    //! a real multiplexing protocol.
    use super::*;
    use std::sync::Mutex;

    pub struct SingleStreamMuxer {
        inner: Mutex<Option<Box<SecureConnection>>>,
    }

    impl SingleStreamMuxer {
        pub fn new(inner: Box<SecureConnection>) -> Self {
            Self { inner: Mutex::new(Some(inner)) }
        }
    }

    #[async_trait]
    impl Muxer for SingleStreamMuxer {
        async fn open_stream(&self) -> crate::Result<Box<SecureConnection>> {
            self.inner.lock().unwrap().take().ok_or(crate::Error::StreamLimit)
        }

        async fn accept_stream(&self) -> crate::Result<Box<SecureConnection>> {
            self.inner.lock().unwrap().take().ok_or(crate::Error::StreamLimit)
        }

        async fn close(&self) {}
    }

    pub struct SingleStreamMuxerFactory;

    #[async_trait]
    impl MuxerFactory for SingleStreamMuxerFactory {
        async fn new_muxer(&self, secure: Box<SecureConnection>, _server: bool) -> crate::Result<Box<dyn Muxer>> {
            Ok(Box::new(SingleStreamMuxer::new(secure)))
        }
    }
}
