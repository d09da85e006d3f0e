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

use std::fs::File;
use std::io::prelude::*;
use std::io::{stdout, BufReader};
use std::path::Path;

use log::info;
use serde_derive::Serialize;
use serde_json::json;

use crate::correlation::CorrelationMatrix;
use crate::error::{RecoError, Result};
use crate::mapping::{EntityMapping, IdMapping};
use crate::relation::SparseBinaryRelation;
use crate::training::EvaluationRecord;
use crate::utils;

/// Reads a relation from whitespace separated pairs of external ids, one pair per line. Both
/// sides of a pair are mapped through the same mapping, which makes this suitable for relations
/// between entities of the same kind, e.g. user-user trust. Blank lines are skipped.
pub fn read_relation<R, M>(reader: R, mapping: &mut M) -> Result<SparseBinaryRelation>
    where R: BufRead, M: IdMapping {

    let mut relation = SparseBinaryRelation::new();

    for_each_pair(reader, |row, column| {
        let row_index = mapping.to_internal_id(row);
        let column_index = mapping.to_internal_id(column);
        relation.insert(row_index, column_index);
    })?;

    Ok(relation)
}

/// Reads a relation between two different kinds of entities, e.g. items and their attributes,
/// mapping the first id of each line with `row_mapping` and the second with `column_mapping`.
pub fn read_bipartite_relation<R, M, N>(
    reader: R,
    row_mapping: &mut M,
    column_mapping: &mut N,
) -> Result<SparseBinaryRelation>
    where R: BufRead, M: IdMapping, N: IdMapping {

    let mut relation = SparseBinaryRelation::new();

    for_each_pair(reader, |row, column| {
        let row_index = row_mapping.to_internal_id(row);
        let column_index = column_mapping.to_internal_id(column);
        relation.insert(row_index, column_index);
    })?;

    Ok(relation)
}

pub fn read_relation_from_file<M: IdMapping>(
    path: &str,
    mapping: &mut M,
) -> Result<SparseBinaryRelation> {

    let file = File::open(&Path::new(path))?;
    let relation = read_relation(BufReader::new(file), mapping)?;

    info!("Read {} entries between {} entities from {}",
        relation.num_entries(), relation.num_entities(), path);

    Ok(relation)
}

/// Reads an item-attribute file, with separate id spaces for rows and columns.
pub fn read_bipartite_relation_from_file<M: IdMapping, N: IdMapping>(
    path: &str,
    row_mapping: &mut M,
    column_mapping: &mut N,
) -> Result<SparseBinaryRelation> {

    let file = File::open(&Path::new(path))?;
    let relation = read_bipartite_relation(BufReader::new(file), row_mapping, column_mapping)?;

    info!("Read {} entries between {} rows and {} columns from {}",
        relation.num_entries(), relation.num_rows(), relation.num_columns(), path);

    Ok(relation)
}

/// Both ids of a line are validated before `on_pair` sees them, so a malformed line never
/// allocates ids or touches the relation.
fn for_each_pair<R, F>(reader: R, mut on_pair: F) -> Result<()>
    where R: BufRead, F: FnMut(u64, u64) {

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;

        let tokens: Vec<&str> = line.split_whitespace().collect();

        if tokens.is_empty() {
            continue;
        }

        if tokens.len() != 2 {
            return Err(RecoError::Format { line_number, line: line.clone() });
        }

        let row = parse_id(tokens[0], line_number)?;
        let column = parse_id(tokens[1], line_number)?;

        on_pair(row, column);
    }

    Ok(())
}

fn parse_id(token: &str, line_number: usize) -> Result<u64> {
    token.parse::<u64>()
        .map_err(|_| RecoError::InvalidId { line_number, token: token.to_string() })
}

/// Struct used for JSON serialization of nearest neighbors. Field names will be used in JSON.
#[derive(Serialize)]
struct Neighbor {
    entity: u64,
    similarity: f64,
}

#[derive(Serialize)]
struct Neighbors {
    for_entity: u64,
    neighbors: Vec<Neighbor>,
}

/// Output the `k` most similar entities per entity in JSON format, using the original
/// identifiers from the input. If an `output_path` is supplied, we write to a file at the
/// specified path, otherwise, we output to stdout.
pub fn write_neighbors(
    correlations: &CorrelationMatrix,
    mapping: &EntityMapping,
    k: usize,
    output_path: Option<String>,
) -> Result<()> {

    let mut out: Box<dyn Write> = match output_path {
        Some(path) => Box::new(File::create(&Path::new(&path))?),
        _ => Box::new(stdout())
    };

    for entity in 0..correlations.num_entities() {

        let for_entity = match mapping.to_external_id(entity as u32) {
            Some(external_id) => external_id,
            None => continue,
        };

        let neighbors: Vec<Neighbor> = correlations.nearest_neighbors(entity as u32, k)
            .into_iter()
            .filter_map(|scored_item| {
                mapping.to_external_id(scored_item.item)
                    .map(|external_id| Neighbor { entity: external_id, similarity: scored_item.score })
            })
            .collect();

        let neighbors_as_json = json!(Neighbors { for_entity, neighbors });

        writeln!(out, "{}", neighbors_as_json.to_string())?;
    }

    Ok(())
}

#[derive(Serialize)]
struct HistoryRow {
    iteration: usize,
    fit: Option<f64>,
    rmse: f64,
    mae: f64,
    evaluation_millis: u64,
}

/// Writes the evaluation history as tab separated rows without headers.
pub fn write_evaluation_history<W: Write>(history: &[EvaluationRecord], out: W) -> Result<()> {

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_writer(out);

    for record in history {
        writer.serialize(HistoryRow {
            iteration: record.iteration,
            fit: record.fit,
            rmse: record.results.rmse(),
            mae: record.results.mae(),
            evaluation_millis: utils::to_millis(record.evaluation_time),
        })?;
    }

    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {

    use std::io::Cursor;
    use crate::correlation::Pearson;
    use crate::error::RecoError;
    use crate::io;
    use crate::mapping::{EntityMapping, IdMapping};

    #[test]
    fn reads_pairs_and_skips_blank_lines() {
        let input = "10 20\n\n   \n20\t30\n10 30\n";
        let mut mapping = EntityMapping::new();

        let relation = io::read_relation(Cursor::new(input), &mut mapping).unwrap();

        assert_eq!(mapping.num_entities(), 3);
        assert_eq!(relation.num_entries(), 3);

        let ten = mapping.internal_id(10).unwrap();
        let twenty = mapping.internal_id(20).unwrap();
        let thirty = mapping.internal_id(30).unwrap();

        assert!(relation.contains(ten, twenty));
        assert!(relation.contains(twenty, thirty));
        assert!(relation.contains(ten, thirty));
        assert!(!relation.contains(twenty, ten));
        assert!(!relation.contains(thirty, thirty));
    }

    #[test]
    fn rejects_wrong_token_counts() {
        for input in &["1 2\n3\n", "1 2\n3 4 5\n"] {
            let mut mapping = EntityMapping::new();
            match io::read_relation(Cursor::new(*input), &mut mapping) {
                Err(RecoError::Format { line_number, .. }) => assert_eq!(line_number, 2),
                other => panic!("Unexpected result {:?}", other),
            }
            // nothing from the malformed line was mapped
            assert_eq!(mapping.num_entities(), 2);
        }
    }

    #[test]
    fn rejects_non_numeric_ids() {
        let mut mapping = EntityMapping::new();
        match io::read_relation(Cursor::new("1 -2\n"), &mut mapping) {
            Err(RecoError::InvalidId { line_number, token }) => {
                assert_eq!(line_number, 1);
                assert_eq!(token, "-2");
            },
            other => panic!("Unexpected result {:?}", other),
        }
        assert_eq!(mapping.num_entities(), 0);
    }

    #[test]
    fn bipartite_relation_uses_separate_mappings() {
        let input = "100 7\n101 7\n100 8\n";
        let mut items = EntityMapping::new();
        let mut attributes = EntityMapping::new();

        let relation =
            io::read_bipartite_relation(Cursor::new(input), &mut items, &mut attributes).unwrap();

        assert_eq!(items.num_entities(), 2);
        assert_eq!(attributes.num_entities(), 2);
        assert_eq!(relation.num_rows(), 2);
        assert_eq!(relation.num_columns(), 2);
        assert!(relation.contains(items.to_internal_id(101), attributes.to_internal_id(7)));
        assert!(!relation.contains(items.to_internal_id(101), attributes.to_internal_id(8)));
    }

    #[test]
    fn reads_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1 2").unwrap();
        writeln!(file, "2 1").unwrap();

        let mut mapping = EntityMapping::new();
        let path = file.path().to_str().unwrap().to_string();
        let relation = io::read_relation_from_file(&path, &mut mapping).unwrap();

        assert_eq!(relation.num_entries(), 2);
        assert!(relation.contains(0, 1));
        assert!(relation.contains(1, 0));
    }

    #[test]
    fn writes_neighbors_for_items_only() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1 10").unwrap();
        writeln!(file, "2 10").unwrap();
        writeln!(file, "2 11").unwrap();

        let mut items = EntityMapping::new();
        let mut attributes = EntityMapping::new();
        let path = file.path().to_str().unwrap().to_string();
        let relation =
            io::read_bipartite_relation_from_file(&path, &mut items, &mut attributes).unwrap();

        let pearson = Pearson::new(relation.num_columns());
        let correlations = crate::row_similarities(&relation, &pearson, 2);

        let output = tempfile::NamedTempFile::new().unwrap();
        let output_path = output.path().to_str().unwrap().to_string();
        io::write_neighbors(&correlations, &items, 10, Some(output_path.clone())).unwrap();

        let lines: Vec<serde_json::Value> = std::fs::read_to_string(&output_path).unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        // one line per item, attribute ids never show up as entities
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["for_entity"], 1);
        assert_eq!(lines[1]["for_entity"], 2);

        let neighbors = lines[0]["neighbors"].as_array().unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0]["entity"], 2);
        // item 2 carries both attributes and has no variance
        assert_eq!(neighbors[0]["similarity"], 0.0);
    }
}
