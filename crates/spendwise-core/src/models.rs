//! Data models for Spendwise

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Datetime format used for purchase and expense dates at the storage boundary
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Spending category
///
/// Serialized with the Korean label so stored records keep their original
/// values. The snake_case code is accepted on input and used by the keyword
/// lexicon file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Category {
    #[serde(rename = "식비", alias = "food")]
    Food,
    #[serde(rename = "사무용품", alias = "office_supplies")]
    OfficeSupplies,
    #[serde(rename = "회식", alias = "dining_out")]
    DiningOut,
    #[serde(rename = "교통비", alias = "transportation")]
    Transportation,
    #[serde(rename = "공과금", alias = "utilities")]
    Utilities,
    #[serde(rename = "유흥", alias = "entertainment")]
    Entertainment,
    #[serde(rename = "교육", alias = "education")]
    Education,
    #[serde(rename = "의료", alias = "health")]
    Health,
    #[default]
    #[serde(rename = "기타", alias = "other")]
    Other,
}

impl Category {
    /// All categories in lexicon order
    pub fn all() -> &'static [Category] {
        &[
            Self::Food,
            Self::OfficeSupplies,
            Self::DiningOut,
            Self::Transportation,
            Self::Utilities,
            Self::Entertainment,
            Self::Education,
            Self::Health,
            Self::Other,
        ]
    }

    /// Storage label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "식비",
            Self::OfficeSupplies => "사무용품",
            Self::DiningOut => "회식",
            Self::Transportation => "교통비",
            Self::Utilities => "공과금",
            Self::Entertainment => "유흥",
            Self::Education => "교육",
            Self::Health => "의료",
            Self::Other => "기타",
        }
    }

    /// Snake_case code used in configuration files
    pub fn code(&self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::OfficeSupplies => "office_supplies",
            Self::DiningOut => "dining_out",
            Self::Transportation => "transportation",
            Self::Utilities => "utilities",
            Self::Entertainment => "entertainment",
            Self::Education => "education",
            Self::Health => "health",
            Self::Other => "other",
        }
    }

    /// Short description of what belongs in the category (used in model prompts)
    pub fn description(&self) -> &'static str {
        match self {
            Self::Food => "식사, 간식, 커피, 음료, 도시락, 빵, 과자",
            Self::OfficeSupplies => "사무용품, 문구류, 볼펜, 노트, 프린터, 책상, 의자",
            Self::DiningOut => "회식, 술, 안주, 고기, 회, 저녁모임, 소주, 맥주",
            Self::Transportation => "교통비, 주유, 택시, 버스, 지하철, 통행료",
            Self::Utilities => "공과금, 전기, 수도, 가스, 통신요금",
            Self::Entertainment => "오락, 영화, 공연, 게임, 노래방",
            Self::Education => "교육, 학원, 강의, 교재, 수강료",
            Self::Health => "병원, 약국, 진료, 치료, 의약품",
            Self::Other => "기타 항목",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        Category::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s || c.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

/// Category filter on a budget: a single category or every category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BudgetCategory {
    #[default]
    All,
    Only(Category),
}

impl BudgetCategory {
    /// Storage label for the "every category" sentinel
    pub const ALL_LABEL: &'static str = "전체";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => Self::ALL_LABEL,
            Self::Only(category) => category.as_str(),
        }
    }

    /// Whether an expense in `category` counts toward this filter
    pub fn matches(&self, category: Category) -> bool {
        match self {
            Self::All => true,
            Self::Only(c) => *c == category,
        }
    }
}

impl std::str::FromStr for BudgetCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s == Self::ALL_LABEL || s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse().map(Self::Only)
    }
}

impl Serialize for BudgetCategory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BudgetCategory {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How an expense got its category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMethod {
    #[default]
    Auto,
    Manual,
}

impl ClassificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for ClassificationMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown classification method: {}", s)),
        }
    }
}

/// OCR processing state of a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OcrStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OcrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for OcrStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown OCR status: {}", s)),
        }
    }
}

/// How many expenses a processed receipt produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptGranularity {
    /// One expense for the receipt total
    #[default]
    Total,
    /// One expense per priced line item
    Item,
}

impl ReceiptGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::Item => "item",
        }
    }
}

impl std::str::FromStr for ReceiptGranularity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "total" | "receipt" => Ok(Self::Total),
            "item" | "items" | "line_item" => Ok(Self::Item),
            _ => Err(format!("Unknown receipt granularity: {}", s)),
        }
    }
}

// ============================================================================
// Users
// ============================================================================

/// A user known to the service. Organization membership is the shared
/// `organization_name` value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(rename = "organizationName", alias = "organization_name")]
    pub organization_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A member as shown on a shared organization page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationMember {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Organization details exposed through a share link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicOrganization {
    pub name: String,
    pub members: Vec<OrganizationMember>,
}

/// Token granting read-only access to one organization's expenses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareToken {
    pub token: String,
    #[serde(rename = "organizationName", alias = "organization_name")]
    pub organization_name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
}

impl ShareToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

// ============================================================================
// Receipts
// ============================================================================

/// Raw OCR line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    /// Line total
    pub price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
}

fn default_quantity() -> f64 {
    1.0
}

/// Receipt record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub user_id: String,
    pub store_name: String,
    pub store_address: Option<String>,
    pub store_phone_number: Option<String>,
    pub total_amount: f64,
    pub purchase_date: NaiveDateTime,
    pub items: Vec<ReceiptItem>,
    pub image_url: Option<String>,
    pub ocr_status: OcrStatus,
    /// Raw provider payload, or `{"error": ...}` for failed receipts
    pub ocr_raw_data: Option<serde_json::Value>,
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ocr_processed_at: Option<DateTime<Utc>>,
}

/// New receipt for insertion
#[derive(Debug, Clone, Default)]
pub struct NewReceipt {
    pub user_id: String,
    pub store_name: String,
    pub store_address: Option<String>,
    pub store_phone_number: Option<String>,
    pub total_amount: f64,
    pub purchase_date: Option<NaiveDateTime>,
    pub items: Vec<ReceiptItem>,
    pub image_url: Option<String>,
    pub ocr_status: OcrStatus,
    pub ocr_raw_data: Option<serde_json::Value>,
    pub content_hash: Option<String>,
    pub ocr_processed_at: Option<DateTime<Utc>>,
}

/// Receipt moved out of the live collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedReceipt {
    pub id: String,
    pub original_id: String,
    pub archived_at: DateTime<Utc>,
    #[serde(flatten)]
    pub receipt: Receipt,
}

// ============================================================================
// Expenses
// ============================================================================

/// Expense record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub user_id: String,
    pub receipt_id: String,
    pub category: Category,
    pub amount: f64,
    pub date: NaiveDateTime,
    pub store_name: String,
    pub store_address: Option<String>,
    pub store_phone_number: Option<String>,
    pub description: Option<String>,
    pub item_name: Option<String>,
    pub classification_method: ClassificationMethod,
    pub classification_confidence: Option<f64>,
    pub budget_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an expense
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewExpense {
    /// Originating receipt; a synthetic id is generated when absent
    #[serde(default)]
    pub receipt_id: Option<String>,
    pub store_name: String,
    pub amount: f64,
    pub date: NaiveDateTime,
    /// Explicit category; omitted means auto-classify
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub store_address: Option<String>,
    #[serde(default)]
    pub store_phone_number: Option<String>,
    #[serde(default)]
    pub budget_id: Option<String>,
}

/// Partial update of an expense. Only the fields that are set change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpenseUpdate {
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub date: Option<NaiveDateTime>,
    #[serde(default)]
    pub store_name: Option<String>,
    #[serde(default)]
    pub store_address: Option<String>,
    #[serde(default)]
    pub store_phone_number: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub budget_id: Option<String>,
}

impl ExpenseUpdate {
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.amount.is_none()
            && self.date.is_none()
            && self.store_name.is_none()
            && self.store_address.is_none()
            && self.store_phone_number.is_none()
            && self.description.is_none()
            && self.item_name.is_none()
            && self.budget_id.is_none()
    }
}

/// Filters for listing expenses
#[derive(Debug, Clone)]
pub struct ExpenseQuery {
    pub category: Option<Category>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    /// Expand scope to every member of this organization
    pub organization: Option<String>,
    pub limit: i64,
}

impl Default for ExpenseQuery {
    fn default() -> Self {
        Self {
            category: None,
            start: None,
            end: None,
            organization: None,
            limit: 100,
        }
    }
}

/// Spending for one category within a statistics period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpending {
    pub category: Category,
    pub total_amount: f64,
    pub count: i64,
    pub percentage: f64,
}

/// Statistics period (inclusive)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatisticsPeriod {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Expense statistics grouped by category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseStatistics {
    pub total_amount: f64,
    pub total_count: i64,
    pub by_category: Vec<CategorySpending>,
    pub period: StatisticsPeriod,
}

// ============================================================================
// Budgets
// ============================================================================

/// Budget record. `spent`/`remaining` live on [`BudgetWithUsage`] only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "organizationName", alias = "organization_name")]
    pub organization_name: Option<String>,
    pub name: String,
    pub amount: f64,
    pub category: BudgetCategory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    pub fn is_shared(&self) -> bool {
        self.organization_name.is_some()
    }
}

/// Input for creating a budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBudget {
    pub name: String,
    pub amount: f64,
    #[serde(default)]
    pub category: BudgetCategory,
    #[serde(default, rename = "organizationName", alias = "organization_name")]
    pub organization_name: Option<String>,
}

/// Partial update of a budget
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub category: Option<BudgetCategory>,
}

/// Budget with read-time consumption figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetWithUsage {
    #[serde(flatten)]
    pub budget: Budget,
    pub spent: f64,
    pub remaining: f64,
}

// ============================================================================
// Retention reports
// ============================================================================

/// Result of a retention sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted_count: usize,
    pub storage_freed_bytes: u64,
    pub storage_freed_mb: f64,
    pub errors: Vec<String>,
    pub dry_run: bool,
    pub cutoff_date: DateTime<Utc>,
}

/// Result of an archive sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveReport {
    pub archived_count: usize,
    pub errors: Vec<String>,
    pub cutoff_date: DateTime<Utc>,
}

/// Image storage usage across all receipts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_receipts: i64,
    pub failed_receipts: i64,
    pub successful_receipts: i64,
    pub total_storage_bytes: u64,
    pub total_storage_mb: f64,
    pub estimated_monthly_cost_usd: f64,
}

/// Receipt counts for the admin overview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptsSummary {
    pub total_receipts: i64,
    pub recent_receipts_30days: i64,
    pub failed_receipts: i64,
    pub old_receipts_90days: i64,
    pub success_rate: f64,
    pub cleanup_recommended: bool,
}

/// Round a byte count to megabytes with two decimals
pub fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}
