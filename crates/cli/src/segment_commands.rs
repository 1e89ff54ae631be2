//! `courier segment`: preview how a reply would be split and delivered.

use std::{io::Read, path::Path};

use {
    anyhow::{Context, Result},
    courier_auto_reply::{chunk::DeliveryPlan, markup, reply::Reply},
    courier_common::types::MessagePart,
    courier_config::CourierConfig,
};

pub fn handle_segment(
    config: &CourierConfig,
    file: Option<&Path>,
    limit: Option<usize>,
    raw: bool,
) -> Result<()> {
    let markdown = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        },
    };

    let limit = limit.unwrap_or(config.delivery.char_limit);
    let translate = !raw && config.delivery.translate_markup;
    for part in plan(&markdown, limit, translate).parts() {
        println!("{}", render(part)?);
    }
    Ok(())
}

fn plan(markdown: &str, limit: usize, translate: bool) -> DeliveryPlan {
    let plan = DeliveryPlan::from_reply(&Reply::Markdown(markdown.to_string()), limit);
    if translate {
        plan.translate_text(limit, markup::to_channel_markup)
    } else {
        plan
    }
}

/// One JSON line per part.
fn render(part: &MessagePart) -> Result<String> {
    Ok(serde_json::to_string(part)?)
}
