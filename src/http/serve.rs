use std::net::SocketAddr;

use http::{Request, Response};
use hyper::body::{Body, Incoming};
use hyper::service::Service;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;
use tripwire::Tripwire;

use crate::Error;

/// Accept connections on `listener` until `shutdown` fires. Connections in
/// flight are shut down gracefully.
pub async fn serve<S, B>(listener: TcpListener, service: S, mut shutdown: Tripwire)
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Error>,
    S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<Error>,
{
    loop {
        let (peer, conn) = tokio::select! {
            _ = &mut shutdown => break,
            result = listener.accept() => match result {
                Ok((stream, peer)) => (peer, TokioIo::new(stream)),
                Err(err) => {
                    error!(
                        message = "accept new connection failed",
                        %err
                    );

                    continue;
                }
            }
        };

        let mut shutdown = shutdown.clone();
        let service = ConnectInfo {
            peer,
            inner: service.clone(),
        };
        tokio::spawn(async move {
            let builder = Builder::new(TokioExecutor::new());
            let conn = builder.serve_connection(conn, service);
            tokio::pin!(conn);

            loop {
                tokio::select! {
                    result = conn.as_mut() => {
                        if let Err(err) = result {
                            trace!(
                                message = "failed to serve http connection",
                                %peer,
                                %err
                            );
                        }

                        break
                    }
                    _ = &mut shutdown, if !shutdown.is_tripped() => {
                        conn.as_mut().graceful_shutdown();
                    }
                }
            }
        });
    }

    debug!(message = "http server stopped");
}

struct ConnectInfo<S> {
    peer: SocketAddr,
    inner: S,
}

impl<B, S> Service<Request<B>> for ConnectInfo<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn call(&self, mut req: Request<B>) -> Self::Future {
        req.extensions_mut().insert(self.peer);
        self.inner.call(req)
    }
}
