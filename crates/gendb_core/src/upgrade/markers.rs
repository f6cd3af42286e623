//! 14 -> 15: markers become tags, and locations gain a locality.
//!
//! A marker is `(code, text)`. Codes 1 and 2 are the built-in "Complete"
//! and "ToDo" markers; any other code names a custom marker through its
//! text, and a marker with empty text is no marker at all. Person, family
//! and note markers turn into a one-tag `tag_list`; media get an empty tag
//! list; the remaining types simply lose the field.
//!
//! Location bases change from `[street, city, county, state, country,
//! postal, phone]` to `[street, locality, city, ...]`. They live in person
//! and repository addresses (`[private, source_list, date, base]`) and in
//! place main and alternate locations (`[base, parish]`).

use super::{insert, take, UpgradeContext, UpgradeStep};
use crate::error::StoreResult;
use crate::types::{now_timestamp, Handle, ObjectType};
use gendb_codec::Value;
use std::collections::HashMap;

pub(super) struct MarkersToTags;

impl UpgradeStep for MarkersToTags {
    fn version(&self) -> u16 {
        15
    }

    fn name(&self) -> &str {
        "markers to tags"
    }

    fn touched(&self) -> &'static [ObjectType] {
        &[
            ObjectType::Person,
            ObjectType::Family,
            ObjectType::Event,
            ObjectType::Place,
            ObjectType::Media,
            ObjectType::Repository,
            ObjectType::Note,
            ObjectType::Source,
        ]
    }

    fn run(&self, ctx: &mut UpgradeContext<'_>) -> StoreResult<()> {
        let mut tags = TagMaker::load(ctx)?;

        ctx.for_each_pending(ObjectType::Person, |ctx, mut f| {
            let marker = take(&mut f, 15);
            f[15] = tags.tag_list(ctx, &marker)?;
            let addresses = take(&mut f, 9);
            f[9] = convert_addresses(ctx, addresses)?;
            Ok(f)
        })?;
        ctx.for_each_pending(ObjectType::Family, |ctx, mut f| {
            let marker = take(&mut f, 12);
            f[12] = tags.tag_list(ctx, &marker)?;
            Ok(f)
        })?;
        ctx.for_each_pending(ObjectType::Note, |ctx, mut f| {
            let marker = take(&mut f, 6);
            f[6] = tags.tag_list(ctx, &marker)?;
            Ok(f)
        })?;
        ctx.for_each_pending(ObjectType::Media, |_, mut f| {
            f[10] = Value::empty_list();
            Ok(f)
        })?;
        ctx.for_each_pending(ObjectType::Event, |_, mut f| {
            f.remove(11);
            Ok(f)
        })?;
        ctx.for_each_pending(ObjectType::Source, |_, mut f| {
            f.remove(11);
            Ok(f)
        })?;
        ctx.for_each_pending(ObjectType::Repository, |ctx, mut f| {
            f.remove(8);
            let addresses = take(&mut f, 5);
            f[5] = convert_addresses(ctx, addresses)?;
            Ok(f)
        })?;
        ctx.for_each_pending(ObjectType::Place, |ctx, mut f| {
            f.remove(12);
            let main = take(&mut f, 5);
            f[5] = match main {
                Value::Null => Value::Null,
                loc => convert_location(ctx, loc)?,
            };
            let alternates = ctx.array(take(&mut f, 6), "place alt_loc")?;
            f[6] = Value::Array(
                alternates
                    .into_iter()
                    .map(|loc| convert_location(ctx, loc))
                    .collect::<StoreResult<_>>()?,
            );
            Ok(f)
        })?;
        Ok(())
    }
}

/// Creates tags on first use and hands out their handles.
struct TagMaker {
    by_name: HashMap<String, Handle>,
}

impl TagMaker {
    /// Picks up tags left by an earlier, interrupted run.
    fn load(ctx: &UpgradeContext<'_>) -> StoreResult<Self> {
        let mut by_name = HashMap::new();
        for handle in ctx.handles(ObjectType::Tag)? {
            if let Some(raw) = ctx.get(ObjectType::Tag, &handle)? {
                if let Some(name) = raw.fields.get(2).and_then(Value::as_text) {
                    by_name.insert(name.to_string(), handle);
                }
            }
        }
        Ok(Self { by_name })
    }

    fn tag_list(&mut self, ctx: &mut UpgradeContext<'_>, marker: &Value) -> StoreResult<Value> {
        let Some(name) = marker_name(ctx, marker)? else {
            return Ok(Value::empty_list());
        };
        let handle = match self.by_name.get(&name) {
            Some(handle) => handle.clone(),
            None => {
                let handle = Handle::generate();
                let priority = i64::try_from(self.by_name.len()).unwrap_or(i64::MAX);
                let gramps_id = ObjectType::Tag.format_gramps_id(self.by_name.len() as u64);
                ctx.commit(
                    ObjectType::Tag,
                    vec![
                        Value::from(&handle),
                        Value::from(gramps_id),
                        Value::from(name.as_str()),
                        Value::from(""),
                        Value::Integer(priority),
                        Value::Integer(now_timestamp()),
                    ],
                )?;
                self.by_name.insert(name, handle.clone());
                handle
            }
        };
        Ok(Value::Array(vec![Value::from(handle)]))
    }
}

fn marker_name(ctx: &UpgradeContext<'_>, marker: &Value) -> StoreResult<Option<String>> {
    let Some(parts) = marker.as_array() else {
        return Err(ctx.fail(format!("marker: expected a list, found {}", marker.kind_name())));
    };
    let code = parts.first().and_then(Value::as_integer).unwrap_or(0);
    let text = parts.get(1).and_then(Value::as_text).unwrap_or("");
    let name = match code {
        1 => "Complete",
        2 => "ToDo",
        _ => text,
    };
    Ok((!name.is_empty()).then(|| name.to_string()))
}

fn add_locality(ctx: &UpgradeContext<'_>, base: Value) -> StoreResult<Value> {
    let mut base = ctx.array(base, "location base")?;
    if base.is_empty() {
        return Err(ctx.fail("location base is empty"));
    }
    insert(&mut base, 1, Value::from(""));
    Ok(Value::Array(base))
}

fn convert_location(ctx: &UpgradeContext<'_>, location: Value) -> StoreResult<Value> {
    let mut location = ctx.array(location, "location")?;
    if location.len() != 2 {
        return Err(ctx.fail(format!("location has {} fields, expected 2", location.len())));
    }
    let base = take(&mut location, 0);
    location[0] = add_locality(ctx, base)?;
    Ok(Value::Array(location))
}

fn convert_addresses(ctx: &UpgradeContext<'_>, addresses: Value) -> StoreResult<Value> {
    let addresses = ctx.array(addresses, "address_list")?;
    let mut converted = Vec::with_capacity(addresses.len());
    for address in addresses {
        let mut address = ctx.array(address, "address")?;
        if address.len() != 4 {
            return Err(ctx.fail(format!("address has {} fields, expected 4", address.len())));
        }
        let base = take(&mut address, 3);
        address[3] = add_locality(ctx, base)?;
        converted.push(Value::Array(address));
    }
    Ok(Value::Array(converted))
}
