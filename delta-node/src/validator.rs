//! Syntactic block verification
//!
//! Everything that can be checked from the block alone, before its parent
//! state is consulted.

use crate::block::VmBlock;
use crate::{NodeError, NodeResult};
use delta_core::block::{calc_ext_data_hash, calc_uncle_hash, derive_tx_hash};
use delta_core::params::protocol::{ATOMIC_GAS_LIMIT, BLACKHOLE_ADDRESS, PHASE1_MIN_GAS_PRICE};
use delta_core::{Gas, Hash, Rules};
use delta_vm::atomic::{AtomicTxError, ChainContext};
use std::collections::HashMap;

pub struct BlockValidator {
    ctx: ChainContext,
    genesis_hash: Hash,
    max_future_block_time: u64,
    /// Expected ext data hashes of blocks produced before Phase1
    ext_data_hashes: Option<HashMap<Hash, Hash>>,
}

impl BlockValidator {
    pub fn new(ctx: ChainContext, genesis_hash: Hash, max_future_block_time: u64) -> Self {
        Self {
            ctx,
            genesis_hash,
            max_future_block_time,
            ext_data_hashes: None,
        }
    }

    pub fn with_ext_data_hashes(mut self, table: HashMap<Hash, Hash>) -> Self {
        self.ext_data_hashes = Some(table);
        self
    }

    fn verify_legacy_ext_data(&self, block: &VmBlock) -> NodeResult<()> {
        let Some(table) = &self.ext_data_hashes else {
            return Ok(());
        };
        let ext_data = block.block().ext_data();
        let expected = table.get(&block.id());
        if ext_data.is_empty() {
            if let Some(expected) = expected {
                return Err(NodeError::MissingLegacyExtData {
                    block: block.id(),
                    height: block.height(),
                    expected: *expected,
                });
            }
            return Ok(());
        }
        let actual = calc_ext_data_hash(ext_data)?;
        let expected = expected.copied().unwrap_or_default();
        if actual != expected {
            return Err(NodeError::LegacyExtDataMismatch {
                block: block.id(),
                height: block.height(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Check `block` under `rules` with the local clock at `now`
    pub fn syntactic_verify(&self, block: &VmBlock, rules: &Rules, now: u64) -> NodeResult<()> {
        let header = &block.block().header;

        if !rules.is_phase1 {
            self.verify_legacy_ext_data(block)?;
        }

        if block.id() == self.genesis_hash {
            return Ok(());
        }

        if rules.is_phase1 {
            let want = calc_ext_data_hash(block.block().ext_data())?;
            if header.ext_data_hash != want {
                return Err(NodeError::ExtDataHashMismatch {
                    have: header.ext_data_hash,
                    want,
                });
            }
        } else if !header.ext_data_hash.is_zero() {
            return Err(NodeError::UnexpectedExtDataHash(header.ext_data_hash));
        }

        if header.difficulty != 1 {
            return Err(NodeError::InvalidDifficulty(header.difficulty));
        }
        if header.nonce != 0 {
            return Err(NodeError::InvalidBlockNonce(header.nonce));
        }
        if !header.mix_digest.is_zero() {
            return Err(NodeError::InvalidMixDigest(header.mix_digest));
        }

        if let Some(expected) = rules.gas_limit() {
            if header.gas_limit != expected {
                return Err(NodeError::InvalidGasLimit {
                    expected,
                    actual: header.gas_limit,
                });
            }
        }

        if !rules.valid_extra_len(header.extra.len()) {
            return Err(NodeError::InvalidExtraSize(header.extra.len()));
        }

        if block.block().version != 0 {
            return Err(NodeError::InvalidVersion(block.block().version));
        }

        let txs_hash = derive_tx_hash(&block.block().transactions)?;
        if txs_hash != header.tx_hash {
            return Err(NodeError::TxHashMismatch {
                have: header.tx_hash,
                want: txs_hash,
            });
        }
        let uncle_hash = calc_uncle_hash(&block.block().uncles)?;
        if uncle_hash != header.uncle_hash {
            return Err(NodeError::UncleHashMismatch {
                have: header.uncle_hash,
                want: uncle_hash,
            });
        }
        if header.coinbase != BLACKHOLE_ADDRESS {
            return Err(NodeError::InvalidCoinbase(header.coinbase));
        }
        if !block.block().uncles.is_empty() {
            return Err(NodeError::UnclesUnsupported);
        }
        if block.block().transactions.is_empty() && block.atomic_txs().is_empty() {
            return Err(NodeError::EmptyBlock);
        }

        if !rules.is_phase1 {
            for tx in &block.block().transactions {
                if tx.gas_price < PHASE1_MIN_GAS_PRICE {
                    return Err(NodeError::GasPriceTooLow {
                        tx: tx.hash()?,
                        price: tx.gas_price,
                        min: PHASE1_MIN_GAS_PRICE,
                    });
                }
            }
        }

        let max = now.saturating_add(self.max_future_block_time);
        if header.time > max {
            return Err(NodeError::FutureBlock {
                time: header.time,
                max,
            });
        }

        if rules.is_phase3 && header.base_fee.is_none() {
            return Err(NodeError::MissingBaseFee);
        }
        if rules.is_phase4 {
            let have = header
                .ext_data_gas_used
                .ok_or(NodeError::MissingExtDataGasUsed)?;
            if have > ATOMIC_GAS_LIMIT {
                return Err(NodeError::ExtDataGasTooLarge(have));
            }
            let mut want: Gas = 0;
            for tx in block.atomic_txs() {
                want = want
                    .checked_add(tx.gas_used(rules.is_phase5)?)
                    .ok_or(AtomicTxError::Overflow("ext data gas"))?;
            }
            if have != want {
                return Err(NodeError::ExtDataGasMismatch { have, want });
            }
            let cost = header.block_gas_cost.ok_or(NodeError::MissingBlockGasCost)?;
            if cost > u128::from(u64::MAX) {
                return Err(NodeError::BlockGasCostTooLarge(cost));
            }
        }

        for tx in block.atomic_txs() {
            tx.unsigned.verify(&self.ctx, rules)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use delta_core::params::Upgrade;
    use delta_core::{Block, ChainConfig, Header};

    const NOW: u64 = 1_000;

    fn validator() -> BlockValidator {
        BlockValidator::new(chain_context(), Hash::new([0x9e; 32]), 10)
    }

    /// Header that passes every syntactic check under `test_chain`
    fn header() -> Header {
        Header {
            number: 1,
            time: NOW,
            difficulty: 1,
            coinbase: BLACKHOLE_ADDRESS,
            gas_limit: 15_000_000,
            extra: vec![0u8; 80],
            base_fee: Some(1),
            ext_data_gas_used: Some(0),
            block_gas_cost: Some(0),
            ..Default::default()
        }
    }

    fn block(header: Header) -> VmBlock {
        let block = Block::new(header, vec![transfer(0, 30_000_000_000_000_000)], vec![], None, true).unwrap();
        VmBlock::new(block, true).unwrap()
    }

    fn check(header: Header) -> NodeResult<()> {
        let config = ChainConfig::test_chain();
        validator().syntactic_verify(&block(header), &config.rules(1, NOW), NOW)
    }

    #[test]
    fn test_valid_block_passes() {
        check(header()).unwrap();
    }

    #[test]
    fn test_header_field_checks() {
        let mut bad = header();
        bad.difficulty = 2;
        assert!(matches!(check(bad), Err(NodeError::InvalidDifficulty(2))));

        let mut bad = header();
        bad.nonce = 1;
        assert!(matches!(check(bad), Err(NodeError::InvalidBlockNonce(1))));

        let mut bad = header();
        bad.mix_digest = Hash::new([1u8; 32]);
        assert!(matches!(check(bad), Err(NodeError::InvalidMixDigest(_))));

        let mut bad = header();
        bad.gas_limit = 8_000_000;
        assert!(matches!(
            check(bad),
            Err(NodeError::InvalidGasLimit {
                expected: 15_000_000,
                actual: 8_000_000
            })
        ));

        let mut bad = header();
        bad.extra = vec![0u8; 64];
        assert!(matches!(check(bad), Err(NodeError::InvalidExtraSize(64))));

        let mut bad = header();
        bad.coinbase = delta_core::Address::new([1u8; 20]);
        assert!(matches!(check(bad), Err(NodeError::InvalidCoinbase(_))));
    }

    #[test]
    fn test_fee_fields_required_once_active() {
        let mut bad = header();
        bad.base_fee = None;
        assert!(matches!(check(bad), Err(NodeError::MissingBaseFee)));

        let mut bad = header();
        bad.ext_data_gas_used = None;
        assert!(matches!(check(bad), Err(NodeError::MissingExtDataGasUsed)));

        let mut bad = header();
        bad.ext_data_gas_used = Some(ATOMIC_GAS_LIMIT + 1);
        assert!(matches!(check(bad), Err(NodeError::ExtDataGasTooLarge(_))));

        let mut bad = header();
        bad.ext_data_gas_used = Some(5);
        assert!(matches!(
            check(bad),
            Err(NodeError::ExtDataGasMismatch { have: 5, want: 0 })
        ));

        let mut bad = header();
        bad.block_gas_cost = None;
        assert!(matches!(check(bad), Err(NodeError::MissingBlockGasCost)));

        let mut bad = header();
        bad.block_gas_cost = Some(u128::from(u64::MAX) + 1);
        assert!(matches!(check(bad), Err(NodeError::BlockGasCostTooLarge(_))));
    }

    #[test]
    fn test_body_commitments() {
        let mut tampered = block(header());
        let mut inner = tampered.block().clone();
        inner.header.tx_hash = Hash::new([7u8; 32]);
        tampered = VmBlock::new(inner, true).unwrap();
        let config = ChainConfig::test_chain();
        assert!(matches!(
            validator().syntactic_verify(&tampered, &config.rules(1, NOW), NOW),
            Err(NodeError::TxHashMismatch { .. })
        ));

        let empty = Block::new(header(), vec![], vec![], None, true).unwrap();
        let empty = VmBlock::new(empty, true).unwrap();
        assert!(matches!(
            validator().syntactic_verify(&empty, &config.rules(1, NOW), NOW),
            Err(NodeError::EmptyBlock)
        ));

        let uncle = Block::new(header(), vec![transfer(0, 1)], vec![Header::default()], None, true).unwrap();
        let uncle = VmBlock::new(uncle, true).unwrap();
        assert!(matches!(
            validator().syntactic_verify(&uncle, &config.rules(1, NOW), NOW),
            Err(NodeError::UnclesUnsupported)
        ));
    }

    #[test]
    fn test_ext_data_hash_rules() {
        let mut bad = header();
        bad.ext_data_hash = Hash::new([1u8; 32]);
        let blk = VmBlock::new(
            Block::new(bad, vec![transfer(0, 1)], vec![], None, false).unwrap(),
            true,
        )
        .unwrap();
        let config = ChainConfig::test_chain();
        assert!(matches!(
            validator().syntactic_verify(&blk, &config.rules(1, NOW), NOW),
            Err(NodeError::ExtDataHashMismatch { .. })
        ));

        let launch = ChainConfig::test_launch().rules(1, NOW);
        assert!(matches!(
            validator().syntactic_verify(&blk, &launch, NOW),
            Err(NodeError::UnexpectedExtDataHash(_))
        ));
    }

    #[test]
    fn test_future_timestamp() {
        let mut late = header();
        late.time = NOW + 11;
        let config = ChainConfig::test_chain();
        let blk = block(late);
        assert!(matches!(
            validator().syntactic_verify(&blk, &config.rules(1, NOW + 11), NOW),
            Err(NodeError::FutureBlock { time: 1_011, max: 1_010 })
        ));
    }

    #[test]
    fn test_gas_price_floor_before_phase1() {
        let launch = ChainConfig::test_launch();
        let mut pre = header();
        pre.extra = Vec::new();
        pre.base_fee = None;
        let cheap = Block::new(pre.clone(), vec![transfer(0, PHASE1_MIN_GAS_PRICE - 1)], vec![], None, false).unwrap();
        let cheap = VmBlock::new(cheap, false).unwrap();
        assert!(matches!(
            validator().syntactic_verify(&cheap, &launch.rules(1, NOW), NOW),
            Err(NodeError::GasPriceTooLow { .. })
        ));

        let priced = Block::new(pre, vec![transfer(0, PHASE1_MIN_GAS_PRICE)], vec![], None, false).unwrap();
        let priced = VmBlock::new(priced, false).unwrap();
        validator()
            .syntactic_verify(&priced, &launch.rules(1, NOW), NOW)
            .unwrap();
    }

    #[test]
    fn test_legacy_ext_data_table() {
        let launch = ChainConfig::test_launch().rules(1, NOW);
        let mut pre = header();
        pre.extra = Vec::new();
        let blk = Block::new(pre, vec![transfer(0, PHASE1_MIN_GAS_PRICE)], vec![], None, false).unwrap();
        let blk = VmBlock::new(blk, false).unwrap();

        let mut table = HashMap::new();
        table.insert(blk.id(), Hash::new([4u8; 32]));
        let strict = validator().with_ext_data_hashes(table);
        assert!(matches!(
            strict.syntactic_verify(&blk, &launch, NOW),
            Err(NodeError::MissingLegacyExtData { .. })
        ));

        // Unlisted blocks without ext data pass
        let lenient = validator().with_ext_data_hashes(HashMap::new());
        lenient.syntactic_verify(&blk, &launch, NOW).unwrap();
    }

    #[test]
    fn test_genesis_skips_checks() {
        let genesis = Block::new(Header::default(), vec![], vec![], None, false).unwrap();
        let genesis = VmBlock::new(genesis, false).unwrap();
        let validator = BlockValidator::new(chain_context(), genesis.id(), 10);
        let rules = ChainConfig::test_through(Upgrade::Phase2).rules(0, 0);
        validator.syntactic_verify(&genesis, &rules, NOW).unwrap();
    }
}
