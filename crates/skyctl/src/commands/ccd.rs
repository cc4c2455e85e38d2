//! Camera command handlers.

use std::sync::Arc;

use skyctl_core::{
    AcquisitionReport, Binning, CcdController, ExposureRequest, FileImageSink, FrameType,
    UploadMode,
};
use tabled::Tabled;

use crate::cli::{CcdArgs, CcdCommand, ExposeArgs, FrameKind, GlobalOpts, UploadTarget};
use crate::config::profile_to_ccd_settings;
use crate::error::CliError;
use crate::output;

use super::{Context, util};

const EXPOSURE_MARKER: &str = "CCD_EXPOSURE";

#[derive(Tabled)]
struct FrameRow {
    #[tabled(rename = "Where")]
    location: &'static str,
    #[tabled(rename = "Frame")]
    frame: String,
}

fn frame_rows(report: &AcquisitionReport) -> Vec<FrameRow> {
    let client = report.client_frames.iter().map(|f| FrameRow {
        location: "client",
        frame: f.clone(),
    });
    let server = report.server_frames.iter().map(|f| FrameRow {
        location: "server",
        frame: f.clone(),
    });
    client.chain(server).collect()
}

fn detail(report: &AcquisitionReport) -> String {
    let rows = frame_rows(report);
    if rows.is_empty() {
        return "No frames recorded".into();
    }
    tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string()
}

fn frame_type(kind: FrameKind) -> FrameType {
    match kind {
        FrameKind::Light => FrameType::Light,
        FrameKind::Bias => FrameType::Bias,
        FrameKind::Dark => FrameType::Dark,
        FrameKind::Flat => FrameType::Flat,
    }
}

fn upload_mode(target: UploadTarget) -> UploadMode {
    match target {
        UploadTarget::Client => UploadMode::Client,
        UploadTarget::Server => UploadMode::Server,
        UploadTarget::Both => UploadMode::ServerAndClient,
    }
}

/// Build the request from flags; the server directory falls back to the
/// profile's `upload_dir`.
fn build_request(args: &ExposeArgs, upload_dir: Option<&str>) -> Result<ExposureRequest, CliError> {
    let binning: Binning = args.bin.parse()?;
    let request = ExposureRequest {
        exposure_time: args.exposure,
        binning,
        frame_type: frame_type(args.frame_type),
        count: args.count,
        delay: args.delay,
        upload_mode: upload_mode(args.upload),
        server_upload_dir: args
            .server_dir
            .clone()
            .or_else(|| upload_dir.map(str::to_owned))
            .unwrap_or_default(),
        filename_template: args.template.clone(),
        object: args.object.clone(),
    };
    request.validate()?;
    Ok(request)
}

pub async fn handle(ctx: &Context, args: CcdArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let profile = &ctx.resolved.profile;
    match args.command {
        CcdCommand::Expose(expose) => {
            let request = build_request(&expose, profile.upload_dir.as_deref())?;
            let device = util::resolve_device(
                &ctx.session,
                args.device.as_deref(),
                profile.ccd_device.as_deref(),
                EXPOSURE_MARKER,
                "camera",
            )
            .await?;

            let controller = CcdController::new(
                ctx.session.clone(),
                device,
                profile_to_ccd_settings(profile, ctx.resolved.timeout),
                Arc::new(FileImageSink::new(&expose.out)),
            );

            let bar = util::progress_bar(u64::from(request.count), global.quiet)?;
            let mut progress = controller.subscribe_progress();
            let acquire = controller.acquire(&request);
            tokio::pin!(acquire);
            let result = loop {
                tokio::select! {
                    result = &mut acquire => break result,
                    changed = progress.changed() => {
                        if changed.is_err() {
                            break (&mut acquire).await;
                        }
                        let p = *progress.borrow_and_update();
                        bar.set_position(u64::from(p.frame.saturating_sub(1)));
                        bar.set_message(format!("{} {}/{}", p.phase, p.frame, p.count));
                    }
                }
            };
            bar.finish_and_clear();

            let report = match result {
                Ok(report) => report,
                Err(e) => {
                    let partial = controller.report().await;
                    if !partial.client_frames.is_empty() || !partial.server_frames.is_empty() {
                        eprintln!("Frames recorded before the failure:\n{}", detail(&partial));
                    }
                    return Err(e.into());
                }
            };

            let out = output::render_single(&global.output, &report, detail, |r| {
                r.client_frames
                    .iter()
                    .chain(&r.server_frames)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n")
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn expose(upload: UploadTarget) -> ExposeArgs {
        ExposeArgs {
            exposure: 2.5,
            bin: "2".into(),
            frame_type: FrameKind::Dark,
            count: 3,
            delay: 0.0,
            upload,
            server_dir: None,
            template: None,
            object: Some("M31".into()),
            out: PathBuf::from("."),
        }
    }

    #[test]
    fn request_from_flags() {
        let request = build_request(&expose(UploadTarget::Client), None).unwrap();
        assert_eq!(request.binning, Binning { x: 2, y: 2 });
        assert_eq!(request.frame_type, FrameType::Dark);
        assert_eq!(request.count, 3);
        assert_eq!(request.object.as_deref(), Some("M31"));
    }

    #[test]
    fn server_upload_uses_profile_directory() {
        let err = build_request(&expose(UploadTarget::Server), None).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));

        let request = build_request(&expose(UploadTarget::Both), Some("/srv/frames")).unwrap();
        assert_eq!(request.upload_mode, UploadMode::ServerAndClient);
        assert_eq!(request.server_upload_dir, "/srv/frames");
    }
}
