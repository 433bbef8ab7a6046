use std::fmt;

/// Field keys of a classification record
///
/// Labels on the detail form are canonicalized (lowercased, spaces to
/// underscores) and resolved against this allow-list. Labels the register
/// introduces later land in [`Field::Other`] so no data is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Title,
    DetailId,
    Classification,
    ConsumerAdvice,
    Category,
    Medium,
    Version,
    Duration,
    DateOfClassification,
    Author,
    Publisher,
    ProductionCompany,
    CountryOfOrigin,
    Applicant,
    FileNumber,
    ClassificationNumber,
    /// A canonical key outside the allow-list
    Other(String),
}

impl Field {
    /// Every key of the allow-list, in storage column order
    pub const KNOWN: [Field; 16] = [
        Field::Title,
        Field::DetailId,
        Field::Classification,
        Field::ConsumerAdvice,
        Field::Category,
        Field::Medium,
        Field::Version,
        Field::Duration,
        Field::DateOfClassification,
        Field::Author,
        Field::Publisher,
        Field::ProductionCompany,
        Field::CountryOfOrigin,
        Field::Applicant,
        Field::FileNumber,
        Field::ClassificationNumber,
    ];

    /// Resolves a detail-form label such as `"Consumer Advice"`
    pub fn from_label(label: &str) -> Self {
        Self::from_key(&canonical_key(label))
    }

    /// Resolves an already canonical key such as `"consumer_advice"`
    pub fn from_key(key: &str) -> Self {
        match key {
            "title" => Self::Title,
            "detail_id" => Self::DetailId,
            "classification" => Self::Classification,
            "consumer_advice" => Self::ConsumerAdvice,
            "category" => Self::Category,
            "medium" => Self::Medium,
            "version" => Self::Version,
            "duration" => Self::Duration,
            "date_of_classification" => Self::DateOfClassification,
            "author" => Self::Author,
            "publisher" => Self::Publisher,
            "production_company" => Self::ProductionCompany,
            "country_of_origin" => Self::CountryOfOrigin,
            "applicant" => Self::Applicant,
            "file_number" => Self::FileNumber,
            "classification_number" => Self::ClassificationNumber,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Title => "title",
            Self::DetailId => "detail_id",
            Self::Classification => "classification",
            Self::ConsumerAdvice => "consumer_advice",
            Self::Category => "category",
            Self::Medium => "medium",
            Self::Version => "version",
            Self::Duration => "duration",
            Self::DateOfClassification => "date_of_classification",
            Self::Author => "author",
            Self::Publisher => "publisher",
            Self::ProductionCompany => "production_company",
            Self::CountryOfOrigin => "country_of_origin",
            Self::Applicant => "applicant",
            Self::FileNumber => "file_number",
            Self::ClassificationNumber => "classification_number",
            Self::Other(key) => key,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label text → key: trimmed, lowercased, spaces replaced with underscores
pub fn canonical_key(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}
