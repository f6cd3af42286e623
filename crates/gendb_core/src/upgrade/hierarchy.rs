//! 16 -> 17: tags everywhere, source attributes, media checksums and the
//! place hierarchy.
//!
//! Flat place locations are split into a tree. Each place keeps its most
//! specific location level as its name; the coarser levels become parent
//! places, shared between places that agree on them. Levels, from the most
//! specific, are street, locality, parish, city, county, state and country,
//! and a level's place type code is `7 - level`.

use super::{insert, take, UpgradeContext, UpgradeStep};
use crate::error::StoreResult;
use crate::objects::CodedType;
use crate::store::MEDIA_PATH_KEY;
use crate::types::{Handle, ObjectType};
use gendb_codec::Value;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub(super) struct PlaceHierarchy;

const LEVELS: usize = 7;

impl UpgradeStep for PlaceHierarchy {
    fn version(&self) -> u16 {
        17
    }

    fn name(&self) -> &str {
        "place hierarchy"
    }

    fn touched(&self) -> &'static [ObjectType] {
        &[
            ObjectType::Event,
            ObjectType::Place,
            ObjectType::Citation,
            ObjectType::Source,
            ObjectType::Repository,
            ObjectType::Media,
        ]
    }

    fn run(&self, ctx: &mut UpgradeContext<'_>) -> StoreResult<()> {
        ctx.for_each_pending(ObjectType::Event, |_, mut f| {
            insert(&mut f, 11, Value::empty_list());
            Ok(f)
        })?;

        PlaceTree::load(ctx)?.convert(ctx)?;

        ctx.for_each_pending(ObjectType::Repository, |_, mut f| {
            insert(&mut f, 8, Value::empty_list());
            Ok(f)
        })?;
        ctx.for_each_pending(ObjectType::Source, |ctx, mut f| {
            let datamap = take(&mut f, 9);
            f[9] = datamap_to_attributes(ctx, datamap)?;
            insert(&mut f, 11, Value::empty_list());
            Ok(f)
        })?;
        ctx.for_each_pending(ObjectType::Citation, |ctx, mut f| {
            let datamap = take(&mut f, 8);
            f[8] = datamap_to_attributes(ctx, datamap)?;
            insert(&mut f, 10, Value::empty_list());
            Ok(f)
        })?;

        let media_root = match ctx.metadata(MEDIA_PATH_KEY)? {
            Some(Value::Text(path)) => PathBuf::from(path),
            _ => PathBuf::new(),
        };
        ctx.for_each_pending(ObjectType::Media, |ctx, mut f| {
            let path = ctx.text(&f[2], "media path")?;
            let checksum = file_checksum(&media_root.join(path));
            insert(&mut f, 5, Value::from(checksum));
            Ok(f)
        })?;
        Ok(())
    }
}

/// Source key/value pairs become `[private, type, value]` attributes.
fn datamap_to_attributes(ctx: &UpgradeContext<'_>, datamap: Value) -> StoreResult<Value> {
    let pairs = ctx.array(datamap, "datamap")?;
    let mut attributes = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let pair = ctx.array(pair, "datamap entry")?;
        let [key, value] = <[Value; 2]>::try_from(pair)
            .map_err(|_| ctx.fail("datamap entry is not a key/value pair"))?;
        let key = ctx.text(&key, "datamap key")?;
        attributes.push(Value::Array(vec![
            Value::Bool(false),
            Value::Array(vec![Value::Integer(CodedType::CUSTOM), Value::from(key)]),
            value,
        ]));
    }
    Ok(Value::Array(attributes))
}

/// Lowercase hex SHA-256 of a media file, or empty if it cannot be read.
fn file_checksum(path: &Path) -> String {
    match fs::read(path) {
        Ok(bytes) => format!("{:x}", Sha256::digest(bytes)),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "no checksum for media file");
            String::new()
        }
    }
}

/// Location levels of a version 16 place plus its postal code.
struct Location {
    levels: Vec<String>,
    postal: String,
}

impl Location {
    /// Splits `main_loc`, a null or `[base, parish]` value.
    fn parse(ctx: &UpgradeContext<'_>, main_loc: &Value) -> StoreResult<Self> {
        let Some(parts) = main_loc.as_array() else {
            return Ok(Self {
                levels: vec![String::new(); LEVELS],
                postal: String::new(),
            });
        };
        let (Some(Value::Array(base)), Some(parish)) = (parts.first(), parts.get(1)) else {
            return Err(ctx.fail("main location is not a [base, parish] pair"));
        };
        if base.len() < 7 {
            return Err(ctx.fail(format!("location base has {} fields", base.len())));
        }
        let text = |v: &Value| ctx.text(v, "location field");
        let levels = vec![
            text(&base[0])?,
            text(&base[1])?,
            text(parish)?,
            text(&base[2])?,
            text(&base[3])?,
            text(&base[4])?,
            text(&base[5])?,
        ];
        Ok(Self {
            levels,
            postal: text(&base[6])?,
        })
    }
}

/// Known locations and the place holding each.
struct PlaceTree {
    locations: HashMap<Vec<String>, Handle>,
    max_id: u64,
}

impl PlaceTree {
    fn load(ctx: &UpgradeContext<'_>) -> StoreResult<Self> {
        let digits = Regex::new("[0-9]+").map_err(|e| ctx.fail(e.to_string()))?;
        let mut tree = Self {
            locations: HashMap::new(),
            max_id: 0,
        };
        for handle in ctx.handles(ObjectType::Place)? {
            let Some(raw) = ctx.get(ObjectType::Place, &handle)? else {
                continue;
            };
            let gramps_id = raw.fields.get(1).and_then(Value::as_text).unwrap_or("");
            if let Some(n) = digits.find(gramps_id).and_then(|m| m.as_str().parse().ok()) {
                tree.max_id = tree.max_id.max(n);
            }
            if raw.version < ctx.version() && !raw.fields[5].is_null() {
                let location = Location::parse(ctx, &raw.fields[5])?;
                tree.locations.insert(location.levels, handle);
            }
        }
        Ok(tree)
    }

    fn convert(mut self, ctx: &mut UpgradeContext<'_>) -> StoreResult<()> {
        ctx.for_each_pending(ObjectType::Place, |ctx, old| self.convert_place(ctx, old))?;
        Ok(())
    }

    fn convert_place(&mut self, ctx: &mut UpgradeContext<'_>, mut old: Vec<Value>) -> StoreResult<Vec<Value>> {
        let Location { mut levels, postal } = Location::parse(ctx, &old[5])?;
        let level = levels
            .iter()
            .position(|s| !s.is_empty())
            .unwrap_or(LEVELS - 1);
        let mut name = std::mem::take(&mut levels[level]);

        let mut parent = None;
        let mut n = LEVELS - 1;
        for candidate in 0..LEVELS {
            if levels[candidate].is_empty() {
                continue;
            }
            if let Some(found) = self.locations.get(&key(&levels, candidate)) {
                parent = Some(found.clone());
                n = candidate;
                break;
            }
        }
        if parent.is_some() {
            n = n.saturating_sub(1);
        }
        while n > level {
            if !levels[n].is_empty() {
                let title = levels[n..]
                    .iter()
                    .filter(|s| !s.is_empty())
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                let handle = self.add_place(ctx, &levels[n], n, parent.take(), title)?;
                self.locations.insert(key(&levels, n), handle.clone());
                parent = Some(handle);
            }
            n -= 1;
        }

        let type_code = if name.is_empty() {
            name = ctx.text(&old[2], "place title")?;
            -1
        } else {
            7 - level as i64
        };

        let private = take(&mut old, 12);
        let mut fields: Vec<Value> = old.drain(..5).collect();
        fields.extend([
            placeref_list(parent),
            Value::from(name),
            Value::empty_list(),
            place_type(type_code),
            Value::from(postal),
        ]);
        // alt_loc through change, now behind main_loc
        fields.extend(old.drain(1..7));
        fields.push(Value::empty_list());
        fields.push(private);
        Ok(fields)
    }

    fn add_place(
        &mut self,
        ctx: &mut UpgradeContext<'_>,
        name: &str,
        level: usize,
        parent: Option<Handle>,
        title: String,
    ) -> StoreResult<Handle> {
        self.max_id += 1;
        let handle = Handle::generate();
        ctx.commit(
            ObjectType::Place,
            vec![
                Value::from(&handle),
                Value::from(ObjectType::Place.format_gramps_id(self.max_id)),
                Value::from(title),
                Value::from(""),
                Value::from(""),
                placeref_list(parent),
                Value::from(name),
                Value::empty_list(),
                place_type(7 - level as i64),
                Value::from(""),
                Value::empty_list(),
                Value::empty_list(),
                Value::empty_list(),
                Value::empty_list(),
                Value::empty_list(),
                Value::Integer(0),
                Value::empty_list(),
                Value::Bool(false),
            ],
        )?;
        Ok(handle)
    }
}

/// Location key with the levels below `n` blanked.
fn key(levels: &[String], n: usize) -> Vec<String> {
    let mut key = vec![String::new(); n];
    key.extend_from_slice(&levels[n..]);
    key
}

fn placeref_list(parent: Option<Handle>) -> Value {
    match parent {
        Some(parent) => Value::Array(vec![Value::Array(vec![Value::from(parent), Value::Null])]),
        None => Value::empty_list(),
    }
}

fn place_type(code: i64) -> Value {
    Value::Array(vec![Value::Integer(code), Value::from("")])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_blank_lower_levels() {
        let levels: Vec<String> = ["a", "b", "", "c", "d", "", "e"].map(String::from).to_vec();
        assert_eq!(key(&levels, 3), ["", "", "", "c", "d", "", "e"]);
        assert_eq!(key(&levels, 0), levels);
    }

    #[test]
    fn unreadable_media_has_no_checksum() {
        assert_eq!(file_checksum(Path::new("/nonexistent/gendb/file.png")), "");
    }
}
