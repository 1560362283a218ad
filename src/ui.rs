use futures::stream::FuturesUnordered;

use crate::{service::Wgcfg, telegram::TelegramDelivery};

pub mod telegram;
pub mod web;

pub fn run(
    tg: telegram::Config,
    web: web::Config,
    service: Wgcfg,
    delivery: &TelegramDelivery,
) -> FuturesUnordered<tokio::task::JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>>
{
    let futures = FuturesUnordered::new();

    futures.push(tokio::spawn(web::start(web, service)));
    if tg.poll {
        futures.push(tokio::spawn(telegram::start(delivery.bot())));
    }

    futures
}
