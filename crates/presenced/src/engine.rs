use chrono::Local;
use presence_core::{CheckIn, EmbeddingProvider, ErrorKind, NewPerson, Person, Recognition, Store};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] presence_core::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("embedding provider failed to start: {0}")]
    ProviderStartup(#[from] presence_core::ProviderError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Core(e) => e.kind(),
            EngineError::InvalidRequest(_) => ErrorKind::Validation,
            _ => ErrorKind::Failure,
        }
    }
}

type StoreJob = Box<dyn FnOnce(&mut Store) + Send>;

/// Messages sent to the engine thread.
enum EngineRequest {
    Enroll {
        profile: NewPerson,
        file_name: String,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Person, EngineError>>,
    },
    Recognize {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Recognition, EngineError>>,
    },
    CheckIn {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<CheckIn, EngineError>>,
    },
    Reencode {
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
    /// Roster, ledger and absence operations that need no provider.
    Store(StoreJob),
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Enroll a person from an uploaded single-face image.
    pub async fn enroll(
        &self,
        profile: NewPerson,
        file_name: String,
        image: Vec<u8>,
    ) -> Result<Person, EngineError> {
        self.call(|reply| EngineRequest::Enroll {
            profile,
            file_name,
            image,
            reply,
        })
        .await
    }

    pub async fn recognize(&self, image: Vec<u8>) -> Result<Recognition, EngineError> {
        self.call(|reply| EngineRequest::Recognize { image, reply })
            .await
    }

    pub async fn check_in(&self, image: Vec<u8>) -> Result<CheckIn, EngineError> {
        self.call(|reply| EngineRequest::CheckIn { image, reply })
            .await
    }

    /// Same as [`check_in`](Self::check_in), for callers on plain OS threads.
    pub fn check_in_blocking(&self, image: Vec<u8>) -> Result<CheckIn, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .blocking_send(EngineRequest::CheckIn {
                image,
                reply: reply_tx,
            })
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.blocking_recv().map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn reencode_all(&self) -> Result<usize, EngineError> {
        self.call(|reply| EngineRequest::Reencode { reply }).await
    }

    /// Run `job` against the store on the engine thread.
    pub async fn with_store<T, F>(&self, job: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut Store) -> Result<T, presence_core::Error> + Send + 'static,
        T: Send + 'static,
    {
        self.call(|reply| {
            EngineRequest::Store(Box::new(move |store| {
                let _ = reply.send(job(store).map_err(EngineError::from));
            }))
        })
        .await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the store and the embedding provider and serves every
/// request in order. The provider is built on that thread; a failure to
/// build it is returned here.
pub async fn spawn_engine<P, F>(store: Store, make_provider: F) -> Result<EngineHandle, EngineError>
where
    P: EmbeddingProvider + 'static,
    F: FnOnce() -> Result<P, presence_core::ProviderError> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);
    let (ready_tx, ready_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("presence-engine".into())
        .spawn(move || {
            let mut store = store;
            let mut provider = match make_provider() {
                Ok(p) => {
                    let _ = ready_tx.send(Ok(()));
                    p
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                handle(&mut store, &mut provider, req);
            }
            tracing::info!("engine thread exiting");
        })?;

    ready_rx.await.map_err(|_| EngineError::ChannelClosed)??;
    Ok(EngineHandle { tx })
}

fn handle(store: &mut Store, provider: &mut dyn EmbeddingProvider, req: EngineRequest) {
    match req {
        EngineRequest::Enroll {
            profile,
            file_name,
            image,
            reply,
        } => {
            let now = Local::now().naive_local();
            let result = store.enroll(provider, profile, &file_name, &image, now);
            if let Err(e) = &result {
                log_failure("enroll", e);
            }
            let _ = reply.send(result.map_err(EngineError::from));
        }
        EngineRequest::Recognize { image, reply } => {
            let result = store.recognize(provider, &image);
            if let Err(e) = &result {
                log_failure("recognize", e);
            }
            let _ = reply.send(result.map_err(EngineError::from));
        }
        EngineRequest::CheckIn { image, reply } => {
            let now = Local::now().naive_local();
            let result = store.check_in(provider, &image, now);
            if let Err(e) = &result {
                log_failure("check_in", e);
            }
            let _ = reply.send(result.map_err(EngineError::from));
        }
        EngineRequest::Reencode { reply } => {
            let result = store.reencode_all(provider);
            if let Err(e) = &result {
                log_failure("reencode", e);
            }
            let _ = reply.send(result.map_err(EngineError::from));
        }
        EngineRequest::Store(job) => job(store),
    }
}

fn log_failure(op: &str, err: &presence_core::Error) {
    match err.kind() {
        ErrorKind::Failure => tracing::error!(op, error = %err, "request failed"),
        _ => tracing::info!(op, error = %err, "request rejected"),
    }
}
