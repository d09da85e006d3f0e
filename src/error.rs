/**
 * LatentReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::io;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, RecoError>;

#[derive(Debug, thiserror::Error)]
pub enum RecoError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A relation line did not consist of exactly two identifiers.
    #[error("Expected two identifiers on line {line_number}, found: '{line}'")]
    Format { line_number: usize, line: String },

    /// A relation line contained a token which is not a non-negative integer.
    #[error("Invalid identifier '{token}' on line {line_number}")]
    InvalidId { line_number: usize, token: String },

    /// No item has both observed interactions and attributes, so rejection sampling
    /// could never accept a candidate.
    #[error("No item has both interactions and attributes")]
    NoEligibleItems,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
