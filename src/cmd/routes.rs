//! `gatehouse routes`: print the acceptors of a config in resolution order.
//!
//! Deploys every API of the file into a throwaway registry, exactly as
//! `run` would, and prints the sorted acceptor snapshot the router reads.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::access_point::AccessPointManager;
use crate::acceptor::Acceptor;
use crate::cli::RoutesArgs;
use crate::config::sources::file_source::FileSource;
use crate::config::ConfigSource;
use crate::error::GatehouseError;
use crate::event::EventManager;
use crate::lifecycle::Node;
use crate::reactor::{GatewayReactorFactory, ReactorHandlerRegistry};
use crate::server;

pub async fn execute(args: &RoutesArgs) -> Result<(), GatehouseError> {
    let source = FileSource::for_path(&args.config)?;
    let (config, _) = source.load().await?;

    let events = EventManager::new();
    let access_points = Arc::new(AccessPointManager::new(events.clone()));
    for access_point in &config.access_points {
        access_points.register(access_point.clone());
    }

    let factory = GatewayReactorFactory::new(
        config.gateway.clone(),
        events,
        access_points,
        Node::new(),
        server::build_http_client(),
    );
    let registry = ReactorHandlerRegistry::new(Arc::new(factory));
    for api in &config.apis {
        registry.create(api).await?;
    }

    print!("{}", format_routes(&registry.acceptors()));
    registry.clear().await;
    Ok(())
}

fn format_routes(acceptors: &[Acceptor]) -> String {
    let rows: Vec<[String; 5]> = acceptors
        .iter()
        .map(|acceptor| {
            let kind = match acceptor {
                Acceptor::Http(_) => "http",
                Acceptor::AccessPoint(_) => "access-point",
                Acceptor::Tcp(_) => "tcp",
            };
            [
                kind.to_string(),
                acceptor.host().unwrap_or_else(|| "*".to_string()),
                if acceptor.is_tcp() {
                    "-".to_string()
                } else {
                    acceptor.path()
                },
                acceptor.priority().to_string(),
                acceptor.reactor().id().to_string(),
            ]
        })
        .collect();

    let header = ["KIND", "HOST", "PATH", "PRIORITY", "API"];
    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut line = |cells: [&str; 5]| {
        let _ = writeln!(
            out,
            "{:<w0$}  {:<w1$}  {:<w2$}  {:>w3$}  {}",
            cells[0],
            cells[1],
            cells[2],
            cells[3],
            cells[4],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
        );
    };
    line(header);
    for row in &rows {
        line([&row[0], &row[1], &row[2], &row[3], &row[4]]);
    }
    out
}
