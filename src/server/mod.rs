pub mod api;

use crate::cli::Args;
use std::error::Error;

pub struct Server {
    addr: String,
    state: api::AppState,
    args: Args,
}

impl Server {
    pub fn new(addr: String, state: api::AppState, args: Args) -> Self {
        Self { addr, state, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(&self.addr, self.state.clone(), &self.args).await
    }
}
