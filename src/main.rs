//! pageshot CLI - capture a region of a PDF's continuous-scroll view as PNG

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use log::{error, warn};

use pageshot_lib::geometry::container_rect_to_client;
use pageshot_lib::pdf::PdfiumParser;
use pageshot_lib::{
    ContinuousSurface, DirectoryExport, DocumentSource, LoadPolicy, Point, Rect, RenderingSurface,
    Viewer, ViewerConfig, ViewerError,
};

#[derive(Parser)]
#[command(name = "pageshot")]
#[command(version)]
#[command(about = "Capture a rectangular region of a PDF's continuous-scroll view as PNG", long_about = None)]
struct Cli {
    /// PDF path, file:// URL or http(s) URL
    #[arg(value_name = "LOCATOR")]
    locator: String,

    /// Selection in view coordinates: left,top,width,height
    #[arg(short, long, value_name = "L,T,W,H", value_parser = parse_region)]
    region: Rect,

    /// Displayed page width in pixels
    #[arg(long, default_value_t = 800.0)]
    display_width: f64,

    /// Vertical gap between pages
    #[arg(long, default_value_t = 10.0)]
    gap: f64,

    /// Height of the simulated viewport
    #[arg(long, default_value_t = 900.0)]
    viewport_height: f64,

    /// Scroll offset before drawing the selection (defaults to the region's top)
    #[arg(long)]
    scroll: Option<f64>,

    /// Internal render scale, overrides the config file
    #[arg(long)]
    scale: Option<f32>,

    /// Render every page up front
    #[arg(long)]
    eager: bool,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    out: PathBuf,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Also print the capture as a data URL
    #[arg(long)]
    data_url: bool,
}

fn parse_region(raw: &str) -> Result<Rect, String> {
    let parts = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in region: {}", e))?;

    if parts.iter().any(|v| !v.is_finite()) {
        return Err("region values must be finite".to_string());
    }
    match parts.as_slice() {
        &[left, top, width, height] if width >= 0.0 && height >= 0.0 => {
            Ok(Rect::new(left, top, width, height))
        }
        &[_, _, _, _] => Err("region width and height must not be negative".to_string()),
        _ => Err(format!("expected 4 comma-separated values, got {}", parts.len())),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(path) => {
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<PathBuf, ViewerError> {
    let mut config = match &cli.config {
        Some(path) => ViewerConfig::from_json_file(path)?,
        None => ViewerConfig::default(),
    };
    if let Some(scale) = cli.scale {
        config.render_scale = scale;
    }
    if cli.eager {
        config.load_policy = LoadPolicy::Eager;
    }
    config.validate()?;

    let source = DocumentSource::from_locator(&cli.locator)?;
    source.check_pdf_path()?;
    let mut viewer = Viewer::new(config);
    viewer.open(&PdfiumParser, source).await?;

    let page_sizes: Vec<(f64, f64)> = {
        let store = viewer.page_store().ok_or(ViewerError::NoDocument)?;
        store
            .document()
            .page_infos()?
            .iter()
            .map(|info| (f64::from(info.width), f64::from(info.height)))
            .collect()
    };

    let surface = Rc::new(ContinuousSurface::fit_width(
        Point::default(),
        cli.display_width + 2.0 * cli.gap,
        cli.viewport_height,
        cli.gap,
        cli.display_width,
        &page_sizes,
    ));
    surface.scroll_to(cli.scroll.unwrap_or(cli.region.top - cli.gap));

    if viewer.config().load_policy == LoadPolicy::Eager {
        let failures = viewer.wait_for_eager_load().await?;
        if failures > 0 {
            warn!("{} page(s) failed to render", failures);
        }
    } else {
        for page_number in surface.pages_intersecting(&cli.region) {
            if let Err(e) = viewer.on_page_visible(page_number).await {
                warn!("Page {} left blank: {}", page_number, e);
            }
        }
    }

    let viewport = surface.viewport();
    let client = container_rect_to_client(&cli.region, viewport.origin, viewport.scroll);

    viewer.start_selection(surface.clone());
    viewer.pointer_down(Point::new(client.left, client.top))?;
    viewer.pointer_move(Point::new(
        client.left + client.width / 2.0,
        client.top + client.height / 2.0,
    ));
    viewer.pointer_up(Point::new(client.right(), client.bottom()))?;

    let sink = DirectoryExport::new(&cli.out);
    let raster = viewer.export_selection(&sink).await?;
    if cli.data_url {
        println!("{}", raster.to_data_url()?);
    }
    Ok(sink.dir().join(raster.file_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_parses_four_numbers() {
        assert_eq!(
            parse_region("10, 20.5,300,40").unwrap(),
            Rect::new(10.0, 20.5, 300.0, 40.0)
        );
    }

    #[test]
    fn region_rejects_bad_input() {
        assert!(parse_region("1,2,3").is_err());
        assert!(parse_region("1,2,x,4").is_err());
        assert!(parse_region("1,2,-3,4").is_err());
        assert!(parse_region("0,0,inf,4").is_err());
        assert!(parse_region("0,0,NaN,4").is_err());
    }

    #[test]
    fn cli_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "pageshot",
            "paper.pdf",
            "--region",
            "0,0,100,100",
            "--scale",
            "2",
            "--eager",
            "-o",
            "/tmp/out",
        ])
        .unwrap();
        assert_eq!(cli.scale, Some(2.0));
        assert!(cli.eager);
        assert_eq!(cli.out, PathBuf::from("/tmp/out"));
        assert_eq!(cli.display_width, 800.0);
    }
}
