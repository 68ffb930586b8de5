use anyhow::Result;
use blockscope_core::hasher::block_hash;
use clap::Parser;

#[derive(Debug, Parser)]
pub struct BlockHash {
    /// Block number
    #[clap(long)]
    number: u64,
    /// Hex-encoded previous block hash
    #[clap(long, value_parser = parse_hex)]
    previous_hash: HexBytes,
    /// Hex-encoded data hash
    #[clap(long, value_parser = parse_hex)]
    data_hash: HexBytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HexBytes(Vec<u8>);

fn parse_hex(value: &str) -> Result<HexBytes, String> {
    hex::decode(value.trim_start_matches("0x"))
        .map(HexBytes)
        .map_err(|err| err.to_string())
}

impl BlockHash {
    pub fn run(self) -> Result<()> {
        println!(
            "{}",
            block_hash(&self.previous_hash.0, &self.data_hash.0, self.number)?
        );
        Ok(())
    }
}
