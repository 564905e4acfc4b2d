mod cli;
mod demo;
mod inbox;
mod infra;

use tenant_connect::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
