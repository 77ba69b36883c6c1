//! Contract interfaces used by the snapshot: the vote-escrow NFT and Multicall3.

use alloy_sol_types::sol;

sol! {
    /// Vote-escrow NFT (veEQUAL). Only the read-only surface the snapshot needs.
    #[sol(all_derives)]
    interface IVotingEscrow {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

        function balanceOfNFT(uint256 tokenId) external view returns (uint256);
        function ownerOf(uint256 tokenId) external view returns (address);
        function locked__end(uint256 tokenId) external view returns (uint256);
        function locked(uint256 tokenId) external view returns (int128 amount, uint256 end);
        function totalSupply() external view returns (uint256);
    }
}

sol! {
    #[sol(all_derives)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (Result[] memory returnData);
    }
}
