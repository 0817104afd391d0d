//! ABI bindings for the administrative surface of vaults and strategies
//!
//! Each contract lives in its own module because both declare
//! `transferOwnership` and the generated call types would collide.

pub mod strategy {
    use ethers::contract::abigen;

    abigen!(
        IStrategyAdmin,
        r#"[
            function panic() external
            function pause() external
            function unpause() external
            function harvest() external
            function transferOwnership(address newOwner) external
        ]"#,
    );
}

pub mod vault {
    use ethers::contract::abigen;

    abigen!(
        IVaultAdmin,
        r#"[
            function transferOwnership(address newOwner) external
        ]"#,
    );
}
