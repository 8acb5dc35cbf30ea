use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Knack field layout for the six VESPA scores per cycle, in category order
/// vision, effort, systems, practice, attitude, overall. Each field may carry
/// a `_raw` companion holding the unformatted value.
const SCORE_FIELDS: [[&str; 6]; 3] = [
    [
        "field_155", "field_156", "field_157", "field_158", "field_159", "field_160",
    ],
    [
        "field_161", "field_162", "field_163", "field_164", "field_165", "field_166",
    ],
    [
        "field_167", "field_168", "field_169", "field_170", "field_171", "field_172",
    ],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Vision,
    Effort,
    Systems,
    Practice,
    Attitude,
    Overall,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Vision,
        Category::Effort,
        Category::Systems,
        Category::Practice,
        Category::Attitude,
        Category::Overall,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Vision => "Vision",
            Category::Effort => "Effort",
            Category::Systems => "Systems",
            Category::Practice => "Practice",
            Category::Attitude => "Attitude",
            Category::Overall => "Overall",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle(u8);

impl Cycle {
    pub fn new(number: u8) -> Option<Cycle> {
        (1..=3).contains(&number).then_some(Cycle(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryScores {
    pub vision: Option<f64>,
    pub effort: Option<f64>,
    pub systems: Option<f64>,
    pub practice: Option<f64>,
    pub attitude: Option<f64>,
    pub overall: Option<f64>,
}

impl CategoryScores {
    pub fn get(&self, category: Category) -> Option<f64> {
        match category {
            Category::Vision => self.vision,
            Category::Effort => self.effort,
            Category::Systems => self.systems,
            Category::Practice => self.practice,
            Category::Attitude => self.attitude,
            Category::Overall => self.overall,
        }
    }

    pub fn set(&mut self, category: Category, value: Option<f64>) {
        match category {
            Category::Vision => self.vision = value,
            Category::Effort => self.effort = value,
            Category::Systems => self.systems = value,
            Category::Practice => self.practice = value,
            Category::Attitude => self.attitude = value,
            Category::Overall => self.overall = value,
        }
    }
}

/// One respondent's survey data across all cycles. Built once at the fetch
/// boundary and never mutated afterwards; `fields` keeps the backend object
/// verbatim for the filter engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub cycles: [CategoryScores; 3],
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn from_raw(raw: &Value) -> Option<Record> {
        let object = raw.as_object()?;
        let id = object
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut cycles = [CategoryScores::default(); 3];
        for (cycle_index, field_row) in SCORE_FIELDS.iter().enumerate() {
            for (category_index, field) in field_row.iter().enumerate() {
                let value = parse_score(object, field);
                cycles[cycle_index].set(Category::ALL[category_index], value);
            }
        }

        Some(Record {
            id,
            cycles,
            fields: object.clone(),
        })
    }

    pub fn scores(&self, cycle: Cycle) -> &CategoryScores {
        &self.cycles[cycle.index()]
    }
}

fn parse_score(object: &Map<String, Value>, field: &str) -> Option<f64> {
    let raw_key = format!("{field}_raw");
    let value = object.get(&raw_key).or_else(|| object.get(field))?;
    coerce_number(value)
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Aggregate {
    pub vision: f64,
    pub effort: f64,
    pub systems: f64,
    pub practice: f64,
    pub attitude: f64,
    pub overall: f64,
}

impl Aggregate {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Vision => self.vision,
            Category::Effort => self.effort,
            Category::Systems => self.systems,
            Category::Practice => self.practice,
            Category::Attitude => self.attitude,
            Category::Overall => self.overall,
        }
    }

    pub fn set(&mut self, category: Category, value: f64) {
        match category {
            Category::Vision => self.vision = value,
            Category::Effort => self.effort = value,
            Category::Systems => self.systems = value,
            Category::Practice => self.practice = value,
            Category::Attitude => self.attitude = value,
            Category::Overall => self.overall = value,
        }
    }
}

/// Counts of rounded integer scores 0 through 10.
pub type Distribution = [u32; 11];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatisticsSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentile_25: f64,
    pub percentile_50: f64,
    pub percentile_75: f64,
    pub confidence_interval_lower: f64,
    pub confidence_interval_upper: f64,
    pub skewness: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Is,
    IsNot,
    Contains,
    DoesNotContain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub subfield: Option<String>,
    pub operator: FilterOperator,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterRule {
    Simple(FieldFilter),
    /// Matches when any sub-rule matches; used for name search across the
    /// first/last sub-fields of a composite name value.
    AnyOf(Vec<FieldFilter>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Establishment(String),
    StaffAdmin(String),
}

impl Scope {
    pub fn cache_fragment(&self) -> String {
        match self {
            Scope::Establishment(id) => format!("est_{id}"),
            Scope::StaffAdmin(id) => format!("staff_{id}"),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Scope::Establishment(id) | Scope::StaffAdmin(id) => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialData {
    #[serde(rename = "vespaResults", default)]
    pub vespa_results: Vec<Value>,
    #[serde(rename = "nationalBenchmark", default)]
    pub national_benchmark: Option<Value>,
    #[serde(rename = "filterOptions", default)]
    pub filter_options: Option<Value>,
    #[serde(rename = "schoolERI", default)]
    pub school_eri: Option<SchoolEri>,
    #[serde(rename = "nationalERI", default)]
    pub national_eri: Option<NationalEri>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchoolEri {
    pub school_eri: Option<f64>,
    #[serde(default)]
    pub response_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NationalEri {
    pub national_eri: Option<f64>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnackData {
    #[serde(default)]
    pub records: Vec<Value>,
}
