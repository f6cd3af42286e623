//! 17 -> 18: place names gain a date and a language.

use super::{take, UpgradeContext, UpgradeStep};
use crate::error::StoreResult;
use crate::types::ObjectType;
use gendb_codec::Value;

pub(super) struct PlaceNames;

impl UpgradeStep for PlaceNames {
    fn version(&self) -> u16 {
        18
    }

    fn name(&self) -> &str {
        "dated place names"
    }

    fn touched(&self) -> &'static [ObjectType] {
        &[ObjectType::Place]
    }

    fn run(&self, ctx: &mut UpgradeContext<'_>) -> StoreResult<()> {
        ctx.for_each_pending(ObjectType::Place, |ctx, mut f| {
            let name = ctx.text(&take(&mut f, 6), "place name")?;
            f[6] = place_name(name);
            let alternates = ctx.array(take(&mut f, 7), "alt_names")?;
            f[7] = Value::Array(
                alternates
                    .iter()
                    .map(|n| ctx.text(n, "alternate place name").map(place_name))
                    .collect::<StoreResult<_>>()?,
            );
            Ok(f)
        })?;
        Ok(())
    }
}

/// `[value, date, lang]` with no date and no language.
fn place_name(value: String) -> Value {
    Value::Array(vec![Value::from(value), Value::Null, Value::from("")])
}
