//! The command registry: typed descriptors behind an erased, process-wide
//! table.
//!
//! Each command binds a name, a request type, a response type, and a
//! handler. The table is built once at first use and read-only thereafter;
//! names are stable identifiers and form part of the wire protocol.
//!
//! Static typing is recovered inside each handler: the erased entry decodes
//! the request with the command's own codec, runs the typed handler, and
//! writes exactly one response (ok or error) per accepted request.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use canopy_protocol::{FrameReader, FrameWriter, WireFormat, STATUS_OK};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::commands;
use crate::error::ServerResult;
use crate::session::SessionCtx;

/// A typed command descriptor.
#[async_trait]
pub trait Command: Send + Sync + 'static {
    /// Stable lowercase wire name.
    const NAME: &'static str;
    type Req: DeserializeOwned + Send + Sync;
    type Res: Serialize + Send + Sync;

    /// Handle one request. Exactly one response is produced per accepted
    /// request: the dispatch layer writes `Ok` results, and recoverable
    /// errors become error replies.
    async fn run(ctx: &mut SessionCtx<'_>, req: Self::Req) -> ServerResult<Self::Res>;
}

/// An entry of the registry with its request/response types erased.
#[async_trait]
pub trait ErasedCommand: Send + Sync {
    fn name(&self) -> &'static str;

    /// Read the request body, run the handler, and write the ok response.
    ///
    /// A body that fails to decode is answered with `"Invalid arguments"`
    /// here (the frame is already consumed, so the stream stays aligned);
    /// handler errors propagate to the dispatch loop.
    async fn dispatch(
        &self,
        reader: &mut FrameReader,
        writer: &Arc<Mutex<FrameWriter>>,
        format: WireFormat,
        ctx: &mut SessionCtx<'_>,
    ) -> ServerResult<()>;
}

struct Handler<C>(PhantomData<fn() -> C>);

#[async_trait]
impl<C: Command> ErasedCommand for Handler<C> {
    fn name(&self) -> &'static str {
        C::NAME
    }

    async fn dispatch(
        &self,
        reader: &mut FrameReader,
        writer: &Arc<Mutex<FrameWriter>>,
        format: WireFormat,
        ctx: &mut SessionCtx<'_>,
    ) -> ServerResult<()> {
        let payload = reader.read_frame().await?;
        let req: C::Req = match format.decode(&payload) {
            Ok(req) => req,
            Err(e) => {
                tracing::debug!(command = C::NAME, error = %e, "request body failed to decode");
                writer.lock().await.reply_error("Invalid arguments").await?;
                return Ok(());
            }
        };
        let res = C::run(ctx, req).await?;
        let mut w = writer.lock().await;
        w.write_status(STATUS_OK).await?;
        w.write_value(format, &res).await?;
        w.flush().await?;
        Ok(())
    }
}

/// Name-indexed table of command descriptors.
pub struct Registry {
    table: HashMap<&'static str, Box<dyn ErasedCommand>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub(crate) fn register<C: Command>(&mut self) {
        let previous = self.table.insert(C::NAME, Box::new(Handler::<C>(PhantomData)));
        debug_assert!(previous.is_none(), "duplicate command name: {}", C::NAME);
    }

    /// Look a command up by wire name.
    pub fn of_name(&self, name: &str) -> Option<&dyn ErasedCommand> {
        self.table.get(name).map(|entry| entry.as_ref())
    }

    /// All registered names, sorted.
    pub fn commands(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.table.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// The process-wide table, built once at startup and never mutated after.
pub fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(commands::build_registry)
}
