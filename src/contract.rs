//! ABI bindings for the task manager contract.

use alloy::sol;

sol! {
    #[sol(rpc, all_derives)]
    contract TaskManager {
        struct Task {
            string contents;
            uint32 taskCreatedBlock;
        }

        event NewTaskCreated(uint32 indexed taskIndex, Task task);

        function createNewTask(string calldata contents) external returns (Task memory);

        function respondToTask(
            Task calldata task,
            uint32 referenceTaskIndex,
            bool isSafe,
            bytes calldata signature
        ) external;
    }
}
