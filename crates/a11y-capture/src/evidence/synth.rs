use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

use a11y_types::{EvidenceKey, EvidenceLayout, EvidenceRole, PixelRect, ScanResult};

use super::imaging::{annotate, encode_png};
use super::{EvidenceContext, NodeEvidence, RenderSurface};
use crate::error::EvidenceError;

/// Produces screen, element, overlay and crop images for every failing node
#[derive(Debug, Clone, Default)]
pub struct EvidenceSynthesizer {}

impl EvidenceSynthesizer {
    pub fn new() -> Self {
        Self {}
    }

    /// Capture evidence for every keyed node of `scan`.
    ///
    /// Nodes are processed one at a time because each one scrolls the shared
    /// page. Per-node failures are recorded as skips; only failing to create
    /// the evidence directories is an error.
    #[instrument(skip_all, fields(root = %layout.root().display(), nodes = scan.node_count()))]
    pub async fn synthesize<S>(
        &self,
        scan: &ScanResult,
        surface: &S,
        layout: &EvidenceLayout,
    ) -> Result<EvidenceContext, EvidenceError>
    where
        S: RenderSurface + ?Sized,
    {
        for role in EvidenceRole::ALL {
            tokio::fs::create_dir_all(layout.dir(role)).await?;
        }

        let mut context = EvidenceContext::default();
        for (key, _, node) in scan.keyed_nodes() {
            let Some(selector) = node.primary_selector() else {
                debug!("Node {} has no CSS selector, skipping", key.ordinal());
                context.skip(key, "no CSS target selector");
                continue;
            };

            match capture_node(key, selector, surface, layout, &mut context).await {
                Ok(evidence) => context.insert(key, evidence),
                Err(e) => {
                    warn!("Skipping node {} ({}): {}", key.ordinal(), selector, e);
                    context.skip(key, e.to_string());
                }
            }
        }

        context.check_role_counts();
        info!(
            "Evidence synthesized: {} nodes, {} skipped",
            context.len(),
            context.skipped().count()
        );
        Ok(context)
    }
}

/// The four PNGs of one node, ready to be written
struct EncodedNode {
    rect: PixelRect,
    screen: Vec<u8>,
    element: Vec<u8>,
    overlay: Vec<u8>,
    crop: Vec<u8>,
}

/// Capture and annotate one node. Nothing is written for the node unless all
/// four images could be produced.
async fn capture_node<S>(
    key: EvidenceKey,
    selector: &str,
    surface: &S,
    layout: &EvidenceLayout,
    context: &mut EvidenceContext,
) -> Result<NodeEvidence, EvidenceError>
where
    S: RenderSurface + ?Sized,
{
    let rect = surface.locate(selector).await?;
    let screen_png = surface.capture_viewport().await?;
    let element_png = surface.capture_element(selector).await?;

    let encoded = tokio::task::spawn_blocking(move || {
        let annotated = annotate(&screen_png, &element_png, &rect)?;
        let (_, crop) = annotated.crop.ok_or(EvidenceError::DegenerateCrop(key))?;
        Ok::<_, EvidenceError>(EncodedNode {
            rect: annotated.element,
            overlay: encode_png(&annotated.overlay)?,
            crop: encode_png(&crop)?,
            screen: screen_png,
            element: element_png,
        })
    })
    .await
    .map_err(|e| EvidenceError::Task(e.to_string()))??;

    Ok(NodeEvidence {
        rect: encoded.rect,
        screen: write_image(layout, EvidenceRole::Screen, key, &encoded.screen, context).await?,
        element: write_image(layout, EvidenceRole::Element, key, &encoded.element, context).await?,
        overlay: write_image(layout, EvidenceRole::Overlay, key, &encoded.overlay, context).await?,
        crop: write_image(layout, EvidenceRole::Crop, key, &encoded.crop, context).await?,
    })
}

async fn write_image(
    layout: &EvidenceLayout,
    role: EvidenceRole,
    key: EvidenceKey,
    png: &[u8],
    context: &mut EvidenceContext,
) -> Result<PathBuf, EvidenceError> {
    let path = layout.path(role, key);
    tokio::fs::write(&path, png).await?;
    context.record_written(role);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::imaging::decode_png;
    use a11y_types::{BoundingRect, Impact, Node, Target, Violation};
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory page: a grey 400x300 viewport with known element rectangles
    struct FakePage {
        rects: HashMap<String, BoundingRect>,
        located: Mutex<Vec<String>>,
    }

    impl FakePage {
        fn new(rects: &[(&str, BoundingRect)]) -> Self {
            Self {
                rects: rects
                    .iter()
                    .map(|(selector, rect)| (selector.to_string(), *rect))
                    .collect(),
                located: Mutex::new(Vec::new()),
            }
        }
    }

    fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        encode_png(&RgbaImage::from_pixel(width, height, Rgba(color))).unwrap()
    }

    #[async_trait]
    impl RenderSurface for FakePage {
        async fn locate(&self, selector: &str) -> Result<BoundingRect, EvidenceError> {
            self.located.lock().unwrap().push(selector.to_string());
            self.rects
                .get(selector)
                .copied()
                .ok_or_else(|| EvidenceError::SelectorNotFound(selector.to_string()))
        }

        async fn capture_viewport(&self) -> Result<Vec<u8>, EvidenceError> {
            Ok(png(400, 300, [128, 128, 128, 255]))
        }

        async fn capture_element(&self, selector: &str) -> Result<Vec<u8>, EvidenceError> {
            let rect = self
                .rects
                .get(selector)
                .ok_or_else(|| EvidenceError::SelectorNotFound(selector.to_string()))?;
            Ok(png(rect.width as u32, rect.height as u32, [0, 0, 255, 255]))
        }
    }

    fn node(selector: Option<&str>) -> Node {
        Node {
            target: selector
                .map(|s| vec![Target::Selector(s.to_string())])
                .unwrap_or_default(),
            html: "<div></div>".to_string(),
            failure_summary: None,
            impact: Impact::Serious,
        }
    }

    fn violation(id: &str, nodes: Vec<Node>) -> Violation {
        Violation {
            id: id.to_string(),
            help: String::new(),
            description: String::new(),
            help_url: String::new(),
            impact: Impact::Serious,
            tags: Vec::new(),
            nodes,
        }
    }

    fn rect(x: f64, y: f64, width: f64, height: f64) -> BoundingRect {
        BoundingRect {
            x,
            y,
            width,
            height,
        }
    }

    #[tokio::test]
    async fn test_skipped_node_does_not_shift_later_keys() {
        let page = FakePage::new(&[
            ("#logo", rect(20.0, 20.0, 60.0, 30.0)),
            ("#nav", rect(100.0, 150.0, 20.0, 80.0)),
        ]);
        let scan = ScanResult {
            url: "https://example.com".to_string(),
            timestamp: None,
            violations: vec![
                violation("image-alt", vec![node(Some("#missing")), node(Some("#logo"))]),
                violation("region", vec![node(None), node(Some("#nav"))]),
            ],
        };
        let dir = tempfile::tempdir().unwrap();
        let layout = EvidenceLayout::new(dir.path().join("evidence"));

        let context = EvidenceSynthesizer::new()
            .synthesize(&scan, &page, &layout)
            .await
            .unwrap();

        assert_eq!(context.len(), 2);
        let skipped: Vec<_> = context.skipped().map(|(key, _)| key).collect();
        assert_eq!(skipped, vec![EvidenceKey::new(0, 0), EvidenceKey::new(1, 0)]);

        let logo = context.get(EvidenceKey::new(0, 1)).unwrap();
        assert_eq!(logo.crop, layout.path(EvidenceRole::Crop, EvidenceKey::new(0, 1)));
        assert!(logo.crop.ends_with("crops/crop_1_2.png"));
        assert!(logo.overlay.exists());

        let nav = context.get(EvidenceKey::new(1, 1)).unwrap();
        // tall element: crop height 80 + 50, side margin ceil((130 - 20) / 2) = 55
        let crop = decode_png(&std::fs::read(&nav.crop).unwrap()).unwrap();
        assert_eq!(crop.dimensions(), (130, 130));

        for role in EvidenceRole::ALL {
            assert_eq!(context.count(role), 2);
        }
        for role in EvidenceRole::ALL {
            assert!(!layout.path(role, EvidenceKey::new(0, 0)).exists());
        }
        // nodes without a selector never reach the page
        assert_eq!(
            *page.located.lock().unwrap(),
            vec!["#missing".to_string(), "#logo".to_string(), "#nav".to_string()]
        );
    }

    #[tokio::test]
    async fn test_empty_scan_creates_role_directories() {
        let page = FakePage::new(&[]);
        let scan = ScanResult {
            url: "https://example.com".to_string(),
            timestamp: None,
            violations: Vec::new(),
        };
        let dir = tempfile::tempdir().unwrap();
        let layout = EvidenceLayout::new(dir.path().join("evidence"));

        let context = EvidenceSynthesizer::new()
            .synthesize(&scan, &page, &layout)
            .await
            .unwrap();

        assert!(context.is_empty());
        for role in EvidenceRole::ALL {
            assert!(layout.dir(role).is_dir());
        }
    }

    #[tokio::test]
    async fn test_corrupt_screenshot_skips_node() {
        struct BrokenPage;

        #[async_trait]
        impl RenderSurface for BrokenPage {
            async fn locate(&self, _: &str) -> Result<BoundingRect, EvidenceError> {
                Ok(rect(0.0, 0.0, 10.0, 10.0))
            }
            async fn capture_viewport(&self) -> Result<Vec<u8>, EvidenceError> {
                Ok(b"not a png".to_vec())
            }
            async fn capture_element(&self, _: &str) -> Result<Vec<u8>, EvidenceError> {
                Ok(png(10, 10, [0, 0, 0, 255]))
            }
        }

        let scan = ScanResult {
            url: "https://example.com".to_string(),
            timestamp: None,
            violations: vec![violation("label", vec![node(Some("input"))])],
        };
        let dir = tempfile::tempdir().unwrap();
        let layout = EvidenceLayout::new(dir.path());

        let context = EvidenceSynthesizer::new()
            .synthesize(&scan, &BrokenPage, &layout)
            .await
            .unwrap();

        assert!(context.is_empty());
        assert_eq!(context.skipped().count(), 1);
        // a skipped node leaves no images behind in any role
        let key = EvidenceKey::new(0, 0);
        for role in EvidenceRole::ALL {
            assert_eq!(context.count(role), 0);
            assert!(!layout.path(role, key).exists());
        }
    }
}
