#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Shelfwise receipt-to-inventory pipeline.
//!
//! Image ingestion -> OCR text -> line-item parsing -> category
//! classification -> expiry prediction -> persisted inventory records.
//!
//! ## Components
//!
//! - **Classifier**: ordered keyword rules, optional AI-assisted fallback
//! - **Shelf-life table**: static category fact base
//! - **Food database**: learned overlay with fuzzy matching and
//!   correction-driven updates
//! - **Predictor**: combines the above with purchase-date arithmetic
//! - **Parser**: pattern grammar over raw OCR text
//! - **Pipeline**: orchestrates the single write path
//! - **Inventory**: persisted receipts/items and dashboard aggregation

pub mod classifier;
pub mod error;
pub mod food_db;
pub mod inventory;
pub mod ocr;
pub mod parser;
pub mod pipeline;
pub mod predictor;
pub mod shelf_life;

pub use classifier::{classify, classify_fine, AiClassifier, DEFAULT_CATEGORY};
pub use error::{CoreError, CoreResult};
pub use food_db::{FoodDb, FoodProduct, MatchKind, ProductMatch};
pub use inventory::{DashboardSummary, InventoryStore, Receipt, ReceiptItem};
pub use ocr::{HttpOcrClient, OcrEngine};
pub use parser::{ParsedItem, ParsedReceipt, ReceiptParser};
pub use pipeline::IngestionPipeline;
pub use predictor::{ExpiryPredictor, Prediction, PredictionMethod};
pub use shelf_life::ShelfLifeEntry;
