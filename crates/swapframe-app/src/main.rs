// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use config::{AppCfg, VsyncMode, DEFAULT_CONFIG_PATH};
use swapframe_core::init_tracing;
use swapframe_platform::Platform;
use swapframe_render::{FrameScheduler, FrameStatus, RenderSize};
use swapframe_vk::{VkRenderer, VkSettings};
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Frames in flight, overriding the config file
    #[arg(long)]
    frames_in_flight: Option<usize>,

    /// Present mode policy, overriding the config file
    #[arg(long, value_enum)]
    vsync_mode: Option<VsyncMode>,
}

/// Counts presented frames and reports them once per second.
struct FpsCounter {
    frames: u32,
    last_report: Instant,
}

impl FpsCounter {
    fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            last_report: now,
        }
    }

    /// Add `presented` frames. Returns the count when a second has passed
    /// since the last report.
    fn tick(&mut self, presented: u64, now: Instant) -> Option<u32> {
        let presented = u32::try_from(presented).unwrap_or(u32::MAX);
        self.frames = self.frames.saturating_add(presented);
        if now.duration_since(self.last_report) < Duration::from_secs(1) {
            return None;
        }
        self.last_report = now;
        Some(std::mem::take(&mut self.frames))
    }
}

fn settings_from(cfg: &AppCfg) -> VkSettings {
    VkSettings {
        app_name: cfg.window.title.clone(),
        frames_in_flight: cfg.render.frames_in_flight,
        vsync: cfg.render.vsync_mode.into(),
        clear_color: cfg.render.clear_color,
        spin_degrees_per_second: cfg.render.spin_degrees_per_second,
        validation: cfg!(debug_assertions) && cfg.render.validation,
    }
}

fn toggled(mode: swapframe_vk::VsyncMode) -> swapframe_vk::VsyncMode {
    match mode {
        swapframe_vk::VsyncMode::Mailbox => swapframe_vk::VsyncMode::Fifo,
        swapframe_vk::VsyncMode::Fifo => swapframe_vk::VsyncMode::Mailbox,
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = AppCfg::load(&args.config).with_overrides(args.frames_in_flight, args.vsync_mode);
    debug!(?cfg, "config");

    let mut platform = Platform::new(&cfg.window.title, cfg.window.width, cfg.window.height)?;
    let window = platform.window().context("window missing after creation")?;
    let size = platform.framebuffer_size();
    let size = RenderSize::new(size.width.max(1), size.height.max(1));
    let renderer =
        VkRenderer::new(window, window, size, settings_from(&cfg)).context("vulkan init")?;
    info!(
        "vsync mode = {:?}, frames in flight = {}",
        renderer.vsync(),
        cfg.render.frames_in_flight
    );

    let mut scheduler = FrameScheduler::new(renderer)?;
    let mut fps = FpsCounter::new(Instant::now());

    while platform.pump() {
        if platform.take_vsync_toggle() {
            let mode = toggled(scheduler.backend().vsync());
            scheduler.backend_mut().set_vsync(mode);
            if scheduler.rebuild_swapchain(&mut platform.events())? {
                info!("vsync mode = {:?}", mode);
            }
        }

        let presented_before = scheduler.stats().presented;
        let status = match scheduler.draw_frame(&mut platform.events()) {
            Ok(status) => status,
            Err(e) => {
                error!("frame failed: {e:#}");
                return Err(e.into());
            }
        };
        match status {
            FrameStatus::Presented { .. } => {}
            FrameStatus::Rebuilt { reasons, .. } => debug!(?reasons, "swapchain rebuilt"),
            FrameStatus::Closing { reasons, .. } => {
                debug!(?reasons, "window closed before the swapchain could be rebuilt")
            }
        }
        let presented = scheduler.stats().presented - presented_before;
        if let Some(frames) = fps.tick(presented, Instant::now()) {
            info!("fps ~ {}", frames);
        }
    }

    let stats = scheduler.stats();
    let renderer = scheduler.finish()?;
    info!(
        "exiting after {} frames, {} swapchain rebuilds",
        stats.presented, stats.rebuilds
    );
    drop(renderer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_reports_once_per_second() {
        let start = Instant::now();
        let mut fps = FpsCounter::new(start);
        for i in 1..=3 {
            assert_eq!(fps.tick(1, start + Duration::from_millis(i * 100)), None);
        }
        assert_eq!(fps.tick(0, start + Duration::from_millis(1000)), Some(3));
        assert_eq!(fps.tick(1, start + Duration::from_millis(1500)), None);
        assert_eq!(fps.tick(1, start + Duration::from_millis(2000)), Some(2));
    }

    #[test]
    fn fps_counts_only_frames_the_scheduler_presented() {
        let start = Instant::now();
        let mut fps = FpsCounter::new(start);
        // an out of date present rebuilds with an image but adds nothing
        assert_eq!(fps.tick(0, start + Duration::from_millis(100)), None);
        assert_eq!(fps.tick(1, start + Duration::from_millis(200)), None);
        assert_eq!(fps.tick(0, start + Duration::from_millis(1000)), Some(1));
    }

    #[test]
    fn settings_follow_config() {
        let cfg = AppCfg::default().with_overrides(Some(3), Some(VsyncMode::Fifo));
        let settings = settings_from(&cfg);
        assert_eq!(settings.frames_in_flight, 3);
        assert_eq!(settings.vsync, swapframe_vk::VsyncMode::Fifo);
        assert_eq!(settings.app_name, "swapframe");
    }

    #[test]
    fn vsync_toggle_flips() {
        let mode = swapframe_vk::VsyncMode::Mailbox;
        assert_eq!(toggled(mode), swapframe_vk::VsyncMode::Fifo);
        assert_eq!(toggled(toggled(mode)), mode);
    }

    #[test]
    fn cli_parses_overrides() {
        let args = Args::parse_from([
            "swapframe",
            "--frames-in-flight",
            "3",
            "--vsync-mode",
            "fifo",
        ]);
        assert_eq!(args.frames_in_flight, Some(3));
        assert_eq!(args.vsync_mode, Some(VsyncMode::Fifo));
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }
}
