use async_trait::async_trait;
use canopy_protocol::messages::names;

use crate::error::ServerResult;
use crate::registry::{Command, Registry};
use crate::session::SessionCtx;

/// `ping`: side-effect-free liveness probe.
pub struct Ping;

#[async_trait]
impl Command for Ping {
    const NAME: &'static str = names::PING;
    type Req = ();
    type Res = ();

    async fn run(_ctx: &mut SessionCtx<'_>, _req: ()) -> ServerResult<()> {
        Ok(())
    }
}

pub(crate) fn register(registry: &mut Registry) {
    registry.register::<Ping>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::Fixture;

    #[tokio::test]
    async fn ping_returns_unit() {
        let mut fx = Fixture::new();
        Ping::run(&mut fx.ctx(), ()).await.unwrap();
    }
}
