use dashmap::DashMap;
use log::{debug, warn};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tract_onnx::prelude::*;
use tract_onnx::tract_hir::infer::Factoid;
use tract_onnx::tract_hir::internal::DimLike;

use crate::error::{PredictError, ServiceError};
use crate::interchange::InterchangeModel;
use crate::models::{CardioFeatures, ModelInfo};
use crate::types::{FeatureFrame, FeatureValue, FEATURE_COLUMNS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Onnx,
    Json,
}

impl ArtifactFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "onnx" => Some(ArtifactFormat::Onnx),
            "json" => Some(ArtifactFormat::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactFormat::Onnx => "onnx",
            ArtifactFormat::Json => "json",
        }
    }
}

/// A deserialized classifier that labels one tabular row at a time.
pub trait Predictor: Send + Sync {
    fn format(&self) -> ArtifactFormat;

    fn kind(&self) -> &str;

    /// Column names the model was fitted on, when the artifact records them.
    fn feature_names(&self) -> Option<Vec<String>>;

    fn predict(&self, frame: &FeatureFrame) -> Result<Vec<i64>, PredictError>;
}

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnnxLayout {
    /// One `[1, width]` tensor in column order.
    Packed { dt: DatumType, width: usize },
    /// One `[1, 1]` tensor per column, inputs named after the columns.
    PerColumn,
}

/// ONNX classifier run through tract, e.g. a scikit-learn export.
pub struct OnnxPredictor {
    plan: OnnxPlan,
    layout: OnnxLayout,
    input_names: Vec<String>,
    input_types: Vec<DatumType>,
}

impl OnnxPredictor {
    pub fn from_reader(reader: &mut dyn io::Read) -> TractResult<Self> {
        let mut model = tract_onnx::onnx().model_for_read(reader)?;

        let input_names = model
            .input_outlets()?
            .iter()
            .map(|o| model.node(o.node).name.clone())
            .collect::<Vec<_>>();
        let declared_types = (0..input_names.len())
            .map(|ix| -> TractResult<Option<DatumType>> {
                Ok(model.input_fact(ix)?.datum_type.concretize())
            })
            .collect::<TractResult<Vec<_>>>()?;

        let layout = match input_names.len() {
            1 => OnnxLayout::Packed {
                dt: declared_types[0].unwrap_or(f32::datum_type()),
                width: Self::declared_width(&model)?.unwrap_or(FEATURE_COLUMNS.len()),
            },
            n if n == FEATURE_COLUMNS.len() => OnnxLayout::PerColumn,
            n => anyhow::bail!(
                "model has {} inputs, expected 1 packed input or {} named columns",
                n,
                FEATURE_COLUMNS.len()
            ),
        };

        let input_types = match layout {
            OnnxLayout::Packed { dt, width } => {
                model.set_input_fact(0, InferenceFact::dt_shape(dt, tvec!(1, width)))?;
                vec![dt]
            }
            OnnxLayout::PerColumn => {
                let mut types = Vec::with_capacity(declared_types.len());
                for (ix, declared) in declared_types.iter().enumerate() {
                    let dt = declared.unwrap_or(f32::datum_type());
                    model.set_input_fact(ix, InferenceFact::dt_shape(dt, tvec!(1, 1)))?;
                    types.push(dt);
                }
                types
            }
        };

        // Keep only the label output; probability maps are not needed.
        let outputs = model.output_outlets()?.to_vec();
        let label = outputs
            .iter()
            .copied()
            .find(|o| model.outlet_label(*o) == Some("label"))
            .or_else(|| outputs.first().copied())
            .ok_or_else(|| anyhow::anyhow!("model declares no outputs"))?;
        model.set_output_outlets(&[label])?;

        let plan = model.into_optimized()?.into_runnable()?;
        let predictor = Self {
            plan,
            layout,
            input_names,
            input_types,
        };
        if predictor.truncates_bmi() {
            warn!("model takes bmi as an integer type; fractional values will be truncated");
        }
        Ok(predictor)
    }

    /// Last dimension of the packed input, when the model pins it.
    fn declared_width(model: &InferenceModel) -> TractResult<Option<usize>> {
        let fact = model.input_fact(0)?;
        Ok(fact
            .shape
            .dims()
            .last()
            .and_then(|dim| dim.concretize())
            .and_then(|dim| dim.to_usize().ok()))
    }

    /// Element type the model receives `bmi` as.
    fn bmi_type(&self) -> Option<DatumType> {
        match self.layout {
            OnnxLayout::Packed { dt, .. } => Some(dt),
            OnnxLayout::PerColumn => self
                .input_names
                .iter()
                .position(|name| name == "bmi")
                .map(|ix| self.input_types[ix]),
        }
    }

    /// True when the model's `bmi` slot is not a float type.
    pub fn truncates_bmi(&self) -> bool {
        self.bmi_type().map_or(false, |dt| !dt.is_float())
    }

    fn column_tensor(value: FeatureValue, dt: DatumType) -> TractResult<Tensor> {
        let tensor = if dt.is_float() {
            Tensor::from_shape(&[1, 1], &[value.as_f32()])?
        } else {
            Tensor::from_shape(&[1, 1], &[value.as_i64()])?
        };
        let cast = tensor.cast_to_dt(dt)?.into_owned();
        Ok(cast)
    }

    fn inputs(&self, frame: &FeatureFrame) -> TractResult<TVec<TValue>> {
        match self.layout {
            OnnxLayout::Packed { dt, .. } => {
                let row = frame.to_f32_row();
                let tensor = Tensor::from_shape(&[1, row.len()], &row)?
                    .cast_to_dt(dt)?
                    .into_owned();
                Ok(tvec!(tensor.into()))
            }
            OnnxLayout::PerColumn => self
                .input_names
                .iter()
                .zip(&self.input_types)
                .map(|(name, dt)| -> TractResult<TValue> {
                    let value = frame
                        .get(name)
                        .ok_or_else(|| anyhow::anyhow!("no column named '{}'", name))?;
                    Ok(Self::column_tensor(value, *dt)?.into())
                })
                .collect(),
        }
    }

    fn run(&self, frame: &FeatureFrame) -> TractResult<Vec<i64>> {
        let outputs = self.plan.run(self.inputs(frame)?)?;
        let labels = outputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("no output tensor"))?;
        if labels.datum_type().is_float() {
            let as_f64 = labels.cast_to::<f64>()?;
            if let Some(bad) = as_f64.as_slice::<f64>()?.iter().find(|v| !v.is_finite()) {
                anyhow::bail!("non-finite label {}", bad);
            }
        }
        let labels = labels.cast_to::<i64>()?;
        Ok(labels.as_slice::<i64>()?.to_vec())
    }
}

impl Predictor for OnnxPredictor {
    fn format(&self) -> ArtifactFormat {
        ArtifactFormat::Onnx
    }

    fn kind(&self) -> &str {
        match self.layout {
            OnnxLayout::Packed { .. } => "onnx_packed",
            OnnxLayout::PerColumn => "onnx_per_column",
        }
    }

    fn feature_names(&self) -> Option<Vec<String>> {
        match self.layout {
            OnnxLayout::Packed { .. } => None,
            OnnxLayout::PerColumn => Some(self.input_names.clone()),
        }
    }

    fn predict(&self, frame: &FeatureFrame) -> Result<Vec<i64>, PredictError> {
        if let OnnxLayout::Packed { width, .. } = self.layout {
            if width != frame.width() {
                return Err(PredictError::SchemaMismatch(format!(
                    "artifact expects {} features, request provides {}",
                    width,
                    frame.width()
                )));
            }
        }
        self.run(frame)
            .map_err(|e| PredictError::Runtime(format!("{:#}", e)))
    }
}

/// Open the artifact, decode it and release the handle before returning.
pub fn load_artifact(path: &Path) -> Result<Arc<dyn Predictor>, ServiceError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ServiceError::ArtifactNotFound {
            path: path.to_path_buf(),
        },
        _ => ServiceError::corrupt(path, e),
    })?;
    let format = ArtifactFormat::from_path(path)
        .ok_or_else(|| ServiceError::corrupt(path, "unrecognised artifact extension"))?;
    let mut reader = BufReader::new(file);

    let predictor: Arc<dyn Predictor> = match format {
        ArtifactFormat::Onnx => Arc::new(
            OnnxPredictor::from_reader(&mut reader)
                .map_err(|e| ServiceError::corrupt(path, format!("{:#}", e)))?,
        ),
        ArtifactFormat::Json => Arc::new(
            InterchangeModel::from_reader(&mut reader).map_err(|e| ServiceError::corrupt(path, e))?,
        ),
    };
    debug!("loaded {} artifact from {}", format.as_str(), path.display());
    Ok(predictor)
}

/// Reloads the predictor for every call unless caching was explicitly enabled.
pub struct ModelInference {
    model_path: PathBuf,
    cache: Option<DashMap<PathBuf, Arc<dyn Predictor>>>,
}

impl ModelInference {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            cache: None,
        }
    }

    /// Keep the first successfully loaded predictor until `clear_cache`.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(DashMap::new);
        self
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    fn predictor(&self) -> Result<Arc<dyn Predictor>, ServiceError> {
        let Some(cache) = &self.cache else {
            return load_artifact(&self.model_path);
        };
        if let Some(hit) = cache.get(&self.model_path) {
            return Ok(Arc::clone(hit.value()));
        }
        let loaded = load_artifact(&self.model_path)?;
        cache.insert(self.model_path.clone(), Arc::clone(&loaded));
        Ok(loaded)
    }

    pub fn predict(&self, features: &CardioFeatures) -> Result<i64, ServiceError> {
        let frame = FeatureFrame::from_features(features);
        let predictor = self.predictor()?;

        match predictor.feature_names() {
            Some(names) => frame
                .check_schema(&names)
                .map_err(PredictError::SchemaMismatch)?,
            None => debug!("artifact declares no feature names, relying on column order"),
        }

        let labels = predictor.predict(&frame)?;
        let label = *labels.first().ok_or(PredictError::EmptyOutput)?;
        debug!("prediction label={} kind={}", label, predictor.kind());
        Ok(label)
    }

    pub fn model_info(&self) -> Result<ModelInfo, ServiceError> {
        let predictor = self.predictor()?;
        Ok(ModelInfo {
            path: self.model_path.display().to_string(),
            format: predictor.format().as_str(),
            kind: predictor.kind().to_string(),
            feature_names: predictor.feature_names(),
            expected_columns: FEATURE_COLUMNS.to_vec(),
            cache_enabled: self.cache_enabled(),
        })
    }

    /// Drop cached predictors; returns how many were evicted.
    pub fn clear_cache(&self) -> usize {
        match &self.cache {
            Some(cache) => {
                let count = cache.len();
                cache.clear();
                count
            }
            None => 0,
        }
    }
}
