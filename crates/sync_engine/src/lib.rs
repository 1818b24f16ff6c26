//! # Sync Engine
//!
//! 双向协同仿真同步引擎。
//!
//! 负责：
//! - 交通仿真与世界仿真之间的实体镜像（spawn / destroy / move）
//! - 坐标系与车灯位域转换
//! - 信号灯相位同步
//! - 类型解析与信号灯 landmark 关联
//!
//! ## 使用示例
//!
//! ```ignore
//! use sync_engine::{ClassResolver, EngineSettings, FirstCandidate, SynchronizationEngine};
//!
//! let resolver = ClassResolver::new(catalog, world_classes, Box::new(FirstCandidate));
//! let mut engine = SynchronizationEngine::new(traffic, world, resolver, EngineSettings::from(&config));
//! engine.initialize().await?;
//!
//! loop {
//!     let step = engine.tick().await?;
//!     // Hand the step result to the traffic peer
//! }
//! ```

pub mod bridge;
mod catalog;
mod correlation;
mod engine;
mod error;

pub use catalog::{
    CandidatePicker, ClassResolver, FirstCandidate, RandomPicker, Resolution, VEHICLE_PREFIX,
};
pub use correlation::{correlate_landmarks, write_landmark_mapping, LandmarkEntry, LandmarkMapping};
pub use engine::{EngineSettings, StepRecorder, SynchronizationEngine};
pub use error::{Result, SyncError};
