//! What an accepted run hands back to the state layer.

use crate::bank::{Protocol, Role, StackBank, Version};
use crate::error::Rejection;
use crate::record::{Anchor, AssetId, NonceRecord, OutputRecord, OutputRef, TxHeader, ValueItem};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedOutput {
    pub id: OutputRef,
    pub record: OutputRecord,
}

/// Net result of an accepted run. Applying it is the state layer's job;
/// the engine never writes outside its own bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Effects {
    pub version: Version,
    pub header: TxHeader,
    /// In creation order.
    pub outputs: Vec<CreatedOutput>,
    pub retirements: Vec<ValueItem>,
    /// Anchors left unconsumed at termination.
    pub anchors: Vec<Anchor>,
    pub spent: Vec<OutputRef>,
    pub nonces: Vec<NonceRecord>,
    pub issued: BTreeMap<AssetId, u128>,
    pub retired: BTreeMap<AssetId, u128>,
}

impl Effects {
    /// Reads the surviving record stacks of a finalized bank.
    pub(crate) fn extract<P: Protocol>(bank: StackBank<P>) -> Result<Self, Rejection> {
        let records = bank.records;
        let header = records
            .header
            .peek()
            .map_err(|_| Rejection::UnbalancedRun { role: Role::TxHeader, len: 0 })
            .and_then(TxHeader::from_tuple)?;

        let outputs = records
            .output
            .iter()
            .map(|t| {
                let record = OutputRecord::from_tuple(t)?;
                Ok(CreatedOutput { id: record.id(), record })
            })
            .collect::<Result<Vec<_>, Rejection>>()?;
        let retirements = records
            .retirement
            .iter()
            .map(ValueItem::from_tuple)
            .collect::<Result<Vec<_>, _>>()?;
        let anchors = records.anchor.iter().map(Anchor::from_tuple).collect::<Result<Vec<_>, _>>()?;

        let journal = records.journal;
        Ok(Self {
            version: P::VERSION,
            header,
            outputs,
            retirements,
            anchors,
            spent: journal.spent,
            nonces: journal.nonces,
            issued: journal.issued,
            retired: journal.retired,
        })
    }

    pub fn run_id(&self) -> [u8; 32] {
        self.header.run_id
    }

    pub fn output_ids(&self) -> impl Iterator<Item = OutputRef> + '_ {
        self.outputs.iter().map(|o| o.id)
    }

    /// Per-asset issued minus retired. For a conserving run this equals
    /// outputs minus spent inputs.
    pub fn net_flow(&self) -> BTreeMap<AssetId, i128> {
        let mut flow: BTreeMap<AssetId, i128> = BTreeMap::new();
        for (asset, n) in &self.issued {
            *flow.entry(*asset).or_default() += *n as i128;
        }
        for (asset, n) in &self.retired {
            *flow.entry(*asset).or_default() -= *n as i128;
        }
        flow
    }

    /// Per-asset total of the clear outputs created.
    pub fn output_totals(&self) -> BTreeMap<AssetId, i128> {
        let mut totals: BTreeMap<AssetId, i128> = BTreeMap::new();
        for out in &self.outputs {
            if let Ok((asset, amount)) = out.record.value.as_clear() {
                *totals.entry(asset).or_default() += amount as i128;
            }
        }
        totals
    }
}
