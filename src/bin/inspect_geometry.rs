//! Print the page geometry table of a PDF at a given zoom.

use anyhow::Context;
use sign_pdf::{DocumentRenderer, GeometryOnly};
use std::fs;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .context("usage: inspect_geometry <file.pdf> [zoom] [--json]")?;
    let zoom: f64 = match args.next() {
        Some(z) => z.parse().with_context(|| format!("invalid zoom {:?}", z))?,
        None => 1.5,
    };
    let as_json = args.any(|a| a == "--json");

    let bytes = fs::read(&path).with_context(|| format!("reading {}", path))?;
    println!("Read {} bytes", bytes.len());

    let loaded = DocumentRenderer::new(zoom, 1.0).load(&bytes, &mut GeometryOnly, &|| true)?;
    let table = &loaded.geometry;

    if as_json {
        println!("{}", serde_json::to_string_pretty(table)?);
        return Ok(());
    }

    println!("Pages: {} at zoom {}", table.page_count(), table.zoom());
    for (i, page) in table.pages().iter().enumerate() {
        println!(
            "  page {:>3}: {:.1}x{:.1} pt -> {:.1}x{:.1} px, top at {:.1}",
            i + 1,
            page.pdf_width,
            page.pdf_height,
            page.viewer_width,
            page.viewer_height,
            page.cumulative_viewer_offset_y
        );
    }
    println!("Total height: {:.1} px", table.total_viewer_height());

    Ok(())
}
