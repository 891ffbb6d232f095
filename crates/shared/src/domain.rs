use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Images,
    Text,
    ObjectDetection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelType {
    Binary,
    Classification,
    Sequence,
    ObjectDetection,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Train,
    Test,
    ModelLabelled,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Train => "TRAIN",
            Stage::Test => "TEST",
            Stage::ModelLabelled => "MODEL_LABELLED",
        }
    }
}

/// Static descriptor of the labelling task served by `/task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(alias = "dataType")]
    pub data_type: DataType,
    #[serde(alias = "labelType")]
    pub label_type: LabelType,
    #[serde(default, alias = "minTrain")]
    pub min_train: u32,
    #[serde(default, alias = "isBatchView")]
    pub is_batch_view: bool,
}

impl Task {
    /// Batch interaction is only offered for image tasks with binary or
    /// classification labels.
    pub fn supports_batch_view(&self) -> bool {
        self.data_type == DataType::Images
            && matches!(
                self.label_type,
                LabelType::Binary | LabelType::Classification
            )
    }

    /// Resolves a view's label input either as a class name or as a 1-based
    /// index into `classes`.
    pub fn class_for(&self, input: &str) -> Option<&str> {
        let input = input.trim();
        if let Some(class) = self.classes.iter().find(|class| class.as_str() == input) {
            return Some(class.as_str());
        }
        let index = input.parse::<usize>().ok()?;
        self.classes
            .get(index.checked_sub(1)?)
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(alias = "path")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: None,
            extra: Map::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgement {
    #[serde(rename = "id")]
    pub item_id: String,
    pub label: String,
}

impl Judgement {
    pub fn new(item_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelledCounts {
    pub total: u64,
    pub train: u64,
    #[serde(default)]
    pub test: u64,
    #[serde(default)]
    pub model_labelled: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One training round reported in `/history`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingRound {
    #[serde(default)]
    pub test: RoundMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train: Option<RoundMetrics>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub unlabelled: u64,
    pub labelled: LabelledCounts,
    #[serde(default)]
    pub history: Vec<TrainingRound>,
}

impl Stats {
    pub fn latest_test_accuracy(&self) -> Option<f64> {
        self.history.last().and_then(|round| round.test.accuracy)
    }

    pub fn training_ready(&self, min_train: u32) -> bool {
        self.labelled.train >= u64::from(min_train)
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
