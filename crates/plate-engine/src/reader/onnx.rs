/// ONNX Runtime plate reader
///
/// Two stages, the first one optional:
/// 1. Detection: a YOLO-style model locates plate regions in the frame
/// 2. Recognition: a CRNN model reads each region, decoded with greedy CTC
///
/// Without a detection model the whole variant is read as a single text line,
/// which suits frames that are already cropped to the plate.
use super::OcrReader;
use anyhow::{bail, Context, Result};
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
        TensorRTExecutionProvider,
    },
    session::{builder::GraphOptimizationLevel, Session},
    value::{DynValue, Value},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Instant;

/// Output names used by common YOLO exports, tried in order
const DETECTION_OUTPUTS: [&str; 3] = ["output0", "output", "boxes"];
/// Output names used by common CRNN exports, tried in order
const RECOGNITION_OUTPUTS: [&str; 3] = ["output", "output0", "logits"];

/// Hardware backend for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionProviderKind {
    #[default]
    #[serde(rename = "CPU", alias = "cpu")]
    Cpu,
    #[serde(rename = "CUDA", alias = "cuda")]
    Cuda,
    #[serde(rename = "TensorRT", alias = "tensorrt", alias = "TENSORRT")]
    TensorRt,
}

impl ExecutionProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "CPU" => Some(Self::Cpu),
            "CUDA" | "GPU" => Some(Self::Cuda),
            "TENSORRT" | "TRT" => Some(Self::TensorRt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::Cuda => "CUDA",
            Self::TensorRt => "TensorRT",
        }
    }

    /// Providers to try, best first, ending with CPU
    fn fallback_chain(&self) -> &'static [ExecutionProviderKind] {
        match self {
            Self::TensorRt => &[Self::TensorRt, Self::Cuda, Self::Cpu],
            Self::Cuda => &[Self::Cuda, Self::Cpu],
            Self::Cpu => &[Self::Cpu],
        }
    }
}

impl fmt::Display for ExecutionProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnnxReaderConfig {
    /// Path to the text recognition (CRNN/CTC) ONNX model
    #[serde(default = "default_recognition_model_path")]
    pub recognition_model_path: String,

    /// Path to the plate detection ONNX model (optional)
    #[serde(default)]
    pub detection_model_path: Option<String>,

    /// Recognition vocabulary; CTC blank is index 0, so this starts at index 1
    #[serde(default = "default_char_vocab")]
    pub char_vocab: String,

    #[serde(default = "default_recognition_input_width")]
    pub recognition_input_width: u32,

    #[serde(default = "default_recognition_input_height")]
    pub recognition_input_height: u32,

    /// Detection model input size (width and height)
    #[serde(default = "default_detection_input_size")]
    pub detection_input_size: u32,

    /// Minimum confidence for a plate region (0.0 to 1.0)
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    /// IoU threshold for non-maximum suppression
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Maximum plate regions read per variant
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    #[serde(default)]
    pub execution_provider: ExecutionProviderKind,

    /// GPU device ID (0, 1, 2, etc.)
    #[serde(default)]
    pub device_id: i32,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    #[serde(default = "default_inter_threads")]
    pub inter_threads: usize,
}

fn default_recognition_model_path() -> String {
    "models/plate_ocr.onnx".to_string()
}

fn default_char_vocab() -> String {
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-".to_string()
}

fn default_recognition_input_width() -> u32 {
    200
}

fn default_recognition_input_height() -> u32 {
    64
}

fn default_detection_input_size() -> u32 {
    640
}

fn default_confidence() -> f32 {
    0.6
}

fn default_iou_threshold() -> f32 {
    0.4
}

fn default_max_detections() -> usize {
    10
}

fn default_intra_threads() -> usize {
    4
}

fn default_inter_threads() -> usize {
    1
}

impl Default for OnnxReaderConfig {
    fn default() -> Self {
        Self {
            recognition_model_path: default_recognition_model_path(),
            detection_model_path: None,
            char_vocab: default_char_vocab(),
            recognition_input_width: default_recognition_input_width(),
            recognition_input_height: default_recognition_input_height(),
            detection_input_size: default_detection_input_size(),
            confidence_threshold: default_confidence(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            execution_provider: ExecutionProviderKind::default(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            inter_threads: default_inter_threads(),
        }
    }
}

/// Plate region in pixel coordinates of the variant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

pub struct OnnxPlateReader {
    config: OnnxReaderConfig,
    vocab: Vec<char>,
    detector: Option<Session>,
    recognizer: Session,
    provider: ExecutionProviderKind,
}

impl OnnxPlateReader {
    /// Load the models. Fails when a model file is missing or no execution
    /// provider can load it.
    pub fn new(config: OnnxReaderConfig) -> Result<Self> {
        if config.char_vocab.is_empty() {
            bail!("OCR character vocabulary cannot be empty");
        }

        let (recognizer, provider) = create_session(&config, &config.recognition_model_path)?;
        tracing::info!(
            model = %config.recognition_model_path,
            provider = %provider,
            device_id = config.device_id,
            "Initialized plate recognition model"
        );

        let detector = match config.detection_model_path.as_deref() {
            Some(path) => {
                let (session, detector_provider) = create_session(&config, path)?;
                tracing::info!(
                    model = %path,
                    provider = %detector_provider,
                    "Initialized plate detection model"
                );
                Some(session)
            }
            None => {
                tracing::info!("Plate detection model not configured - reading whole variants");
                None
            }
        };

        Ok(Self {
            vocab: config.char_vocab.chars().collect(),
            config,
            detector,
            recognizer,
            provider,
        })
    }

    pub fn config(&self) -> &OnnxReaderConfig {
        &self.config
    }

    /// Locate plate regions with the detection model
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<PlateBox>> {
        let Some(detector) = self.detector.as_mut() else {
            return Ok(Vec::new());
        };

        let size = self.config.detection_input_size;
        let input = Value::from_array(preprocess_for_detection(image, size))?;
        let outputs = detector.run(ort::inputs![input])?;

        let value = DETECTION_OUTPUTS
            .iter()
            .find_map(|name| outputs.get(*name))
            .with_context(|| format!("detector has none of the outputs {:?}", DETECTION_OUTPUTS))?;
        let output = tensor_to_array(value)?;

        let boxes = decode_detections(
            &output,
            image.dimensions(),
            size,
            self.config.confidence_threshold,
        )?;
        let mut kept = non_max_suppression(boxes, self.config.iou_threshold);
        kept.truncate(self.config.max_detections);
        Ok(kept)
    }

    /// Read one text line with the recognition model
    fn recognize_line(&mut self, line: &GrayImage, allowed: &str) -> Result<String> {
        let input = preprocess_for_recognition(
            line,
            self.config.recognition_input_width,
            self.config.recognition_input_height,
        );
        let input = Value::from_array(input)?;

        let start = Instant::now();
        let outputs = self.recognizer.run(ort::inputs![input])?;
        telemetry::metrics::PLATE_OCR_INFERENCE_TIME
            .with_label_values(&[self.provider.as_str()])
            .observe(start.elapsed().as_secs_f64());

        let value = RECOGNITION_OUTPUTS
            .iter()
            .find_map(|name| outputs.get(*name))
            .with_context(|| {
                format!("recognizer has none of the outputs {:?}", RECOGNITION_OUTPUTS)
            })?;
        let output = tensor_to_array(value)?;

        ctc_greedy_decode(&output, &self.vocab, allowed)
    }
}

/// Copy an f32 output tensor into an owned ndarray
fn tensor_to_array(value: &DynValue) -> Result<Array<f32, IxDyn>> {
    let (shape, data) = value.try_extract_tensor::<f32>()?;
    let dims = shape
        .as_ref()
        .iter()
        .map(|&d| usize::try_from(d).context("negative tensor dimension"))
        .collect::<Result<Vec<usize>>>()?;
    Ok(Array::from_shape_vec(IxDyn(&dims), data.to_vec())?)
}

impl OcrReader for OnnxPlateReader {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn execution_provider(&self) -> &str {
        self.provider.as_str()
    }

    fn read_text(&mut self, image: &GrayImage, allowed: &str) -> Result<Vec<String>> {
        if self.detector.is_none() {
            let text = self.recognize_line(image, allowed)?;
            return Ok(if text.is_empty() { Vec::new() } else { vec![text] });
        }

        let boxes = self.detect(image)?;
        tracing::debug!(regions = boxes.len(), "Plate regions detected");

        let mut fragments = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let crop = imageops::crop_imm(image, bbox.x, bbox.y, bbox.width, bbox.height).to_image();
            if crop.width() == 0 || crop.height() == 0 {
                continue;
            }
            match self.recognize_line(&crop, allowed) {
                Ok(text) if !text.is_empty() => fragments.push(text),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Plate region OCR failed"),
            }
        }
        Ok(fragments)
    }
}

/// Resize and normalize to NCHW, replicating gray into three channels
fn preprocess_for_detection(image: &GrayImage, size: u32) -> Array<f32, IxDyn> {
    let resized = imageops::resize(image, size, size, FilterType::Triangle);
    let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));

    for (x, y, pixel) in resized.enumerate_pixels() {
        let v = pixel[0] as f32 / 255.0;
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = v;
        }
    }
    input
}

/// Resize and normalize to a single-channel NCHW tensor
fn preprocess_for_recognition(image: &GrayImage, width: u32, height: u32) -> Array<f32, IxDyn> {
    let resized = imageops::resize(image, width, height, FilterType::Triangle);
    let mut input = Array::zeros(IxDyn(&[1, 1, height as usize, width as usize]));

    for (x, y, pixel) in resized.enumerate_pixels() {
        input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
    }
    input
}

/// Decode a YOLO output `[batch, 5, predictions]` (cx, cy, w, h, confidence)
/// into boxes scaled back to the source image.
pub fn decode_detections(
    output: &Array<f32, IxDyn>,
    (width, height): (u32, u32),
    input_size: u32,
    confidence_threshold: f32,
) -> Result<Vec<PlateBox>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] == 0 || shape[1] < 5 {
        bail!("Unexpected detection output shape {:?}", shape);
    }

    let scale_x = width as f32 / input_size as f32;
    let scale_y = height as f32 / input_size as f32;

    let mut boxes = Vec::new();
    for i in 0..shape[2] {
        let confidence = output[[0, 4, i]];
        if confidence < confidence_threshold {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];

        let x = ((cx - w / 2.0) * scale_x).clamp(0.0, width as f32) as u32;
        let y = ((cy - h / 2.0) * scale_y).clamp(0.0, height as f32) as u32;
        let box_w = ((w * scale_x) as u32).min(width - x);
        let box_h = ((h * scale_y) as u32).min(height - y);
        if box_w == 0 || box_h == 0 {
            continue;
        }

        boxes.push(PlateBox {
            x,
            y,
            width: box_w,
            height: box_h,
            confidence,
        });
    }
    Ok(boxes)
}

/// Keep the most confident box of every overlapping group
pub fn non_max_suppression(mut boxes: Vec<PlateBox>, iou_threshold: f32) -> Vec<PlateBox> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<PlateBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection over union of two boxes
pub fn iou(a: &PlateBox, b: &PlateBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let intersection = if x2 > x1 && y2 > y1 {
        ((x2 - x1) * (y2 - y1)) as f32
    } else {
        0.0
    };

    let union = (a.width * a.height) as f32 + (b.width * b.height) as f32 - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Greedy CTC decoding of `[batch, timesteps, classes]` scores.
///
/// Blank is class 0 and class `i` maps to `vocab[i - 1]`. Repeats collapse
/// unless separated by a blank. Characters outside `allowed` are dropped
/// (an empty allow-list keeps everything).
pub fn ctc_greedy_decode(output: &Array<f32, IxDyn>, vocab: &[char], allowed: &str) -> Result<String> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] == 0 {
        bail!("Unexpected OCR output shape {:?}", shape);
    }
    let (timesteps, classes) = (shape[1], shape[2]);

    let mut text = String::new();
    let mut prev = 0;
    for t in 0..timesteps {
        let mut best = 0;
        let mut best_score = f32::NEG_INFINITY;
        for c in 0..classes {
            let score = output[[0, t, c]];
            if score > best_score {
                best_score = score;
                best = c;
            }
        }

        if best != 0 && best != prev {
            if let Some(&ch) = vocab.get(best - 1) {
                if allowed.is_empty() || allowed.contains(ch) {
                    text.push(ch);
                }
            }
        }
        prev = best;
    }
    Ok(text)
}

fn create_session(config: &OnnxReaderConfig, model_path: &str) -> Result<(Session, ExecutionProviderKind)> {
    if !Path::new(model_path).exists() {
        bail!("ONNX model not found at {}", model_path);
    }

    let mut last_error = None;
    for &kind in config.execution_provider.fallback_chain() {
        tracing::info!(provider = %kind, model = %model_path, "Attempting execution provider");
        match build_session(config, model_path, kind) {
            Ok(session) => return Ok((session, kind)),
            Err(e) => {
                tracing::warn!(provider = %kind, error = %e, "Execution provider failed");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(e.context(format!("Failed to load model {}", model_path))),
        None => bail!("No execution provider available for {}", model_path),
    }
}

fn build_session(
    config: &OnnxReaderConfig,
    model_path: &str,
    kind: ExecutionProviderKind,
) -> Result<Session> {
    let providers: Vec<ExecutionProviderDispatch> = match kind {
        ExecutionProviderKind::TensorRt => vec![
            TensorRTExecutionProvider::default()
                .with_device_id(config.device_id)
                .build(),
            CUDAExecutionProvider::default()
                .with_device_id(config.device_id)
                .build(),
            CPUExecutionProvider::default().build(),
        ],
        ExecutionProviderKind::Cuda => vec![
            CUDAExecutionProvider::default()
                .with_device_id(config.device_id)
                .build(),
            CPUExecutionProvider::default().build(),
        ],
        ExecutionProviderKind::Cpu => vec![CPUExecutionProvider::default().build()],
    };

    let session = Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(config.intra_threads)
        .context("Failed to set intra threads")?
        .with_inter_threads(config.inter_threads)
        .context("Failed to set inter threads")?
        .with_execution_providers(providers)
        .context("Failed to set execution providers")?
        .commit_from_file(model_path)
        .context("Failed to load model from file")?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: u32, y: u32, width: u32, height: u32, confidence: f32) -> PlateBox {
        PlateBox {
            x,
            y,
            width,
            height,
            confidence,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = OnnxReaderConfig::default();
        assert_eq!(config.recognition_model_path, "models/plate_ocr.onnx");
        assert!(config.detection_model_path.is_none());
        assert_eq!(config.confidence_threshold, 0.6);
        assert_eq!(config.iou_threshold, 0.4);
        assert_eq!(config.max_detections, 10);
        assert_eq!(config.recognition_input_width, 200);
        assert_eq!(config.recognition_input_height, 64);
        assert_eq!(config.execution_provider, ExecutionProviderKind::Cpu);
        assert!(config.char_vocab.contains("ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
    }

    #[test]
    fn test_config_deserializes_partial_json() {
        let config: OnnxReaderConfig = serde_json::from_str(
            r#"{"recognition_model_path": "/opt/ocr.onnx", "execution_provider": "TensorRT"}"#,
        )
        .unwrap();
        assert_eq!(config.recognition_model_path, "/opt/ocr.onnx");
        assert_eq!(config.execution_provider, ExecutionProviderKind::TensorRt);
        assert_eq!(config.intra_threads, 4);
    }

    #[test]
    fn test_execution_provider_parse() {
        assert_eq!(ExecutionProviderKind::parse("cuda"), Some(ExecutionProviderKind::Cuda));
        assert_eq!(
            ExecutionProviderKind::parse("TensorRT"),
            Some(ExecutionProviderKind::TensorRt)
        );
        assert_eq!(ExecutionProviderKind::parse(" cpu "), Some(ExecutionProviderKind::Cpu));
        assert_eq!(ExecutionProviderKind::parse("npu"), None);
        assert_eq!(
            ExecutionProviderKind::TensorRt.fallback_chain().last(),
            Some(&ExecutionProviderKind::Cpu)
        );
    }

    #[test]
    fn test_missing_model_fails() {
        let config = OnnxReaderConfig {
            recognition_model_path: "/nonexistent/plate_ocr.onnx".to_string(),
            ..Default::default()
        };
        let err = OnnxPlateReader::new(config).err().unwrap();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_iou() {
        let a = bbox(10, 10, 50, 20, 0.9);
        let b = bbox(30, 15, 50, 20, 0.8);
        let value = iou(&a, &b);
        assert!(value > 0.0 && value < 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 0.001);
        assert_eq!(iou(&a, &bbox(100, 100, 50, 20, 0.5)), 0.0);
    }

    #[test]
    fn test_nms() {
        let boxes = vec![
            bbox(10, 10, 100, 30, 0.8),
            bbox(15, 12, 100, 30, 0.9),
            bbox(200, 200, 100, 30, 0.85),
        ];
        let kept = non_max_suppression(boxes, 0.4);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.85);
    }

    #[test]
    fn test_decode_detections_scales_and_filters() {
        // Two predictions on a 100x100 input: one confident, one not
        let mut output = Array::zeros(IxDyn(&[1, 5, 2]));
        for (row, value) in [50.0, 50.0, 40.0, 20.0, 0.9].iter().enumerate() {
            output[[0, row, 0]] = *value;
        }
        output[[0, 4, 1]] = 0.1;

        let boxes = decode_detections(&output, (200, 100), 100, 0.6).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0], bbox(60, 40, 80, 20, 0.9));

        let bad = Array::zeros(IxDyn(&[1, 3]));
        assert!(decode_detections(&bad, (10, 10), 100, 0.5).is_err());
    }

    #[test]
    fn test_decode_detections_empty_batch_is_error() {
        let empty: Array<f32, IxDyn> = Array::zeros(IxDyn(&[0, 5, 4]));
        assert!(decode_detections(&empty, (10, 10), 100, 0.5).is_err());
    }

    fn one_hot(sequence: &[usize], classes: usize) -> Array<f32, IxDyn> {
        let mut output = Array::from_elem(IxDyn(&[1, sequence.len(), classes]), 0.01f32);
        for (t, &c) in sequence.iter().enumerate() {
            output[[0, t, c]] = 0.9;
        }
        output
    }

    #[test]
    fn test_ctc_decode() {
        let vocab: Vec<char> = default_char_vocab().chars().collect();
        let classes = vocab.len() + 1;
        // blank, A, A, blank, A, B, C, blank ('A' is class 11)
        let output = one_hot(&[0, 11, 11, 0, 11, 12, 13, 0], classes);
        assert_eq!(ctc_greedy_decode(&output, &vocab, "").unwrap(), "AABC");
    }

    #[test]
    fn test_ctc_decode_respects_allow_list() {
        let vocab: Vec<char> = default_char_vocab().chars().collect();
        let classes = vocab.len() + 1;
        // A, '-', 1 ('-' is the last class, '1' is class 2)
        let output = one_hot(&[11, 37, 2], classes);
        assert_eq!(ctc_greedy_decode(&output, &vocab, "").unwrap(), "A-1");
        assert_eq!(
            ctc_greedy_decode(&output, &vocab, "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789").unwrap(),
            "A1"
        );
    }

    #[test]
    fn test_ctc_decode_rejects_bad_shapes() {
        let vocab: Vec<char> = default_char_vocab().chars().collect();
        let empty: Array<f32, IxDyn> = Array::zeros(IxDyn(&[0, 8, vocab.len() + 1]));
        assert!(ctc_greedy_decode(&empty, &vocab, "").is_err());

        let flat: Array<f32, IxDyn> = Array::zeros(IxDyn(&[8, vocab.len() + 1]));
        assert!(ctc_greedy_decode(&flat, &vocab, "").is_err());
    }

    #[test]
    fn test_preprocess_shapes() {
        let img = GrayImage::from_pixel(120, 40, image::Luma([255]));
        let det = preprocess_for_detection(&img, 64);
        assert_eq!(det.shape(), &[1, 3, 64, 64]);
        let rec = preprocess_for_recognition(&img, 200, 64);
        assert_eq!(rec.shape(), &[1, 1, 64, 200]);
        assert!((rec[[0, 0, 10, 10]] - 1.0).abs() < 1e-6);
    }
}
