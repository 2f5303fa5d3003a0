mod ledger;
mod part_size;
mod transform;
