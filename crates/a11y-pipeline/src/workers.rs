//! Production stage workers

use anyhow::Context;
use async_trait::async_trait;
use futures::FutureExt;
use tracing::{info, instrument};

use a11y_capture::{with_session, EvidenceSynthesizer, ScanError, ScanExecutor, SessionConfig};
use a11y_composer::{CropDirectory, ReportComposer};
use a11y_types::{ArtifactLayout, EvidenceLayout, JobStage, ScanResult};

use crate::jobs::{ComposeJob, ReportArtifact, ScanArtifacts, ScanJob};
use crate::queue::{StageContext, StageWorker};

/// Scan stage: one browser session per job, audit then evidence
#[derive(Debug, Clone)]
pub struct CaptureWorker {
    session: SessionConfig,
    executor: ScanExecutor,
    synthesizer: EvidenceSynthesizer,
    artifacts: ArtifactLayout,
}

impl CaptureWorker {
    pub fn new(session: SessionConfig, executor: ScanExecutor, artifacts: ArtifactLayout) -> Self {
        Self {
            session,
            executor,
            synthesizer: EvidenceSynthesizer::new(),
            artifacts,
        }
    }
}

#[async_trait]
impl StageWorker<ScanJob> for CaptureWorker {
    type Output = ScanArtifacts;

    #[instrument(skip_all, fields(request_id = %job.request_id, attempt = context.attempt()))]
    async fn run(&self, job: &ScanJob, context: &StageContext) -> anyhow::Result<ScanArtifacts> {
        anyhow::ensure!(
            job.request_id.is_path_safe(),
            "request id '{}' cannot be used as a directory name",
            job.request_id
        );

        let evidence_layout = self.artifacts.evidence(&job.request_id);
        let executor = self.executor.clone();
        let synthesizer = self.synthesizer.clone();
        let target = job.target_domain.clone();
        let request_id = job.request_id.clone();
        let stage_context = context.clone();
        let layout = evidence_layout.clone();

        let (scan, evidence) = with_session(&self.session, move |session| {
            async move {
                let scan = executor.execute(session, &target).await?;
                stage_context
                    .advance(&request_id, JobStage::Synthesizing)
                    .await;
                let evidence = synthesizer.synthesize(&scan, session, &layout).await?;
                Ok::<_, ScanError>((scan, evidence))
            }
            .boxed()
        })
        .await
        .with_context(|| format!("Scan of {} failed", job.target_domain))?;

        let scan_file = self.artifacts.scan_file(&job.request_id);
        let json = serde_json::to_vec_pretty(&scan).context("Failed to serialize scan result")?;
        tokio::fs::write(&scan_file, json)
            .await
            .with_context(|| format!("Failed to write {}", scan_file.display()))?;

        let artifacts = ScanArtifacts {
            scan_file,
            evidence_dir: evidence_layout.root().to_path_buf(),
            violations: scan.violations.len(),
            crops: evidence.crops().count(),
        };
        info!(
            "Scan stage done: {} violations, {} crops",
            artifacts.violations, artifacts.crops
        );
        Ok(artifacts)
    }
}

/// Report stage: compose the PDF from the handed-off scan and crops
#[derive(Debug, Clone)]
pub struct ComposeWorker {
    composer: ReportComposer,
    artifacts: ArtifactLayout,
}

impl ComposeWorker {
    pub fn new(composer: ReportComposer, artifacts: ArtifactLayout) -> Self {
        Self {
            composer,
            artifacts,
        }
    }
}

#[async_trait]
impl StageWorker<ComposeJob> for ComposeWorker {
    type Output = ReportArtifact;

    #[instrument(skip_all, fields(request_id = %job.request_id, attempt = context.attempt()))]
    async fn run(&self, job: &ComposeJob, context: &StageContext) -> anyhow::Result<ReportArtifact> {
        let raw = tokio::fs::read(&job.scan_file)
            .await
            .with_context(|| format!("Failed to read {}", job.scan_file.display()))?;
        let scan: ScanResult = serde_json::from_slice(&raw)
            .with_context(|| format!("Malformed scan result {}", job.scan_file.display()))?;

        let composer = self.composer.clone();
        let crops = CropDirectory::new(EvidenceLayout::new(job.evidence_dir.clone()));
        let (pdf, pages) = tokio::task::spawn_blocking(move || {
            let report = composer.compose(&scan, &crops);
            report.to_pdf().map(|pdf| (pdf, report.page_count()))
        })
        .await
        .context("Report composition task failed")?
        .context("Failed to render report")?;

        let report_file = self.artifacts.report_file(&job.request_id);
        if let Some(parent) = report_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&report_file, pdf)
            .await
            .with_context(|| format!("Failed to write {}", report_file.display()))?;

        info!("Report written to {} ({} pages)", report_file.display(), pages);
        Ok(ReportArtifact { report_file, pages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::JobBoard;
    use a11y_types::{EvidenceKey, EvidenceRole, RequestId, RequesterId};

    const SCAN: &str = r#"{
        "url": "https://example.com/",
        "violations": [{
            "id": "image-alt",
            "help": "Images must have alternate text",
            "description": "Ensures <img> elements have alternate text",
            "helpUrl": "https://dequeuniversity.com/rules/axe/4.8/image-alt",
            "impact": "critical",
            "tags": ["wcag2a"],
            "nodes": [
                {"target": ["img#logo"], "html": "<img id=\"logo\">", "impact": "critical"},
                {"target": ["img.hero"], "html": "<img class=\"hero\">", "impact": "critical"}
            ]
        }]
    }"#;

    fn compose_job(root: &std::path::Path, id: &str) -> ComposeJob {
        let layout = ArtifactLayout::new(root);
        let request_id = RequestId::new(id);
        ComposeJob {
            scan_file: layout.scan_file(&request_id),
            evidence_dir: layout.evidence(&request_id).root().to_path_buf(),
            requester: RequesterId::new("u"),
            request_id,
        }
    }

    fn crop_png() -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(40, 30, image::Rgba([200, 30, 30, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_compose_worker_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let job = compose_job(dir.path(), "r1");
        std::fs::create_dir_all(job.scan_file.parent().unwrap()).unwrap();
        std::fs::write(&job.scan_file, SCAN).unwrap();

        let evidence = EvidenceLayout::new(job.evidence_dir.clone());
        std::fs::create_dir_all(evidence.dir(EvidenceRole::Crop)).unwrap();
        std::fs::write(
            evidence.path(EvidenceRole::Crop, EvidenceKey::new(0, 0)),
            crop_png(),
        )
        .unwrap();

        let worker = ComposeWorker::new(ReportComposer::default(), ArtifactLayout::new(dir.path()));
        let artifact = worker
            .run(&job, &StageContext::new(JobBoard::new()))
            .await
            .unwrap();

        assert_eq!(artifact.report_file, dir.path().join("r1").join("report.pdf"));
        assert!(artifact.pages >= 3);
        let pdf = std::fs::read(&artifact.report_file).unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn test_compose_worker_missing_scan_fails() {
        let dir = tempfile::tempdir().unwrap();
        let job = compose_job(dir.path(), "r2");
        let worker = ComposeWorker::new(ReportComposer::default(), ArtifactLayout::new(dir.path()));

        let err = worker
            .run(&job, &StageContext::new(JobBoard::new()))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read"));
        assert!(!dir.path().join("r2").join("report.pdf").exists());
    }

    #[tokio::test]
    async fn test_capture_worker_rejects_unsafe_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let worker = CaptureWorker::new(
            SessionConfig::default(),
            ScanExecutor::new("window.axe = {};"),
            ArtifactLayout::new(dir.path()),
        );
        let job = ScanJob {
            request_id: RequestId::new("../escape"),
            requester: RequesterId::new("u"),
            target_domain: "https://example.com".into(),
        };

        let err = worker
            .run(&job, &StageContext::new(JobBoard::new()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("directory name"));
    }
}
