//! 同步步进指标收集模块
//!
//! 基于 StepResult 收集和统计桥接引擎的运行指标。

use contracts::{EngineSide, StepResult};
use metrics::{counter, gauge, histogram};

/// 从 StepResult 记录指标
///
/// 每次 tick 完成时调用。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_step_metrics;
///
/// let result = engine.tick().await?;
/// record_step_metrics(&result, elapsed_ms);
/// ```
pub fn record_step_metrics(result: &StepResult, duration_ms: f64) {
    // tick 计数器
    counter!("cosim_bridge_ticks_total").increment(1);

    histogram!("cosim_bridge_tick_duration_ms").record(duration_ms);

    for target in [EngineSide::Traffic, EngineSide::World] {
        let label = target.as_str();

        let spawns = result.spawns_for(target).count() as u64;
        if spawns > 0 {
            counter!("cosim_bridge_spawn_requests_total", "target" => label).increment(spawns);
        }

        let destroys = result.destroys_for(target).count() as u64;
        if destroys > 0 {
            counter!("cosim_bridge_destroy_requests_total", "target" => label)
                .increment(destroys);
        }

        let moves = result.moves_for(target).count() as u64;
        if moves > 0 {
            counter!("cosim_bridge_move_requests_total", "target" => label).increment(moves);
        }

        let devices = result.device_updates_for(target).count() as u64;
        if devices > 0 {
            counter!("cosim_bridge_control_device_updates_total", "target" => label)
                .increment(devices);
        }
    }

    if !result.sensor_observations.is_empty() {
        counter!("cosim_bridge_sensor_observations_total")
            .increment(result.sensor_observations.len() as u64);
    }
}

/// 记录当前镜像数量 (按来源引擎)
pub fn record_mirror_count(origin: EngineSide, count: usize) {
    gauge!("cosim_bridge_mirrors", "origin" => origin.as_str()).set(count as f64);
}

/// 记录类型解析失败
pub fn record_resolution_failure(origin: EngineSide) {
    counter!(
        "cosim_bridge_resolution_failures_total",
        "origin" => origin.as_str()
    )
    .increment(1);
}

/// 记录实体竞争 (枚举与读取之间消失)
pub fn record_entity_race(side: EngineSide) {
    counter!("cosim_bridge_entity_races_total", "side" => side.as_str()).increment(1);
}

/// 记录被宿主引擎移除的镜像
pub fn record_lost_mirror(host: EngineSide) {
    counter!("cosim_bridge_lost_mirrors_total", "host" => host.as_str()).increment(1);
}

/// Tick 指标聚合器
///
/// 在内存中聚合指标，便于退出时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct TickStatsAggregator {
    /// 总 tick 数
    pub total_ticks: u64,

    /// 失败的 tick 数
    pub failed_ticks: u64,

    /// 镜像创建总数 (按目标引擎)
    pub spawns: [u64; 2],

    /// 镜像销毁总数 (按目标引擎)
    pub destroys: [u64; 2],

    /// 位姿更新总数
    pub moves: u64,

    /// 信号灯更新总数
    pub control_device_updates: u64,

    /// 传感器观测总数
    pub sensor_observations: u64,

    /// tick 耗时统计 (毫秒)
    pub duration_stats: RunningStats,

    /// 每 tick 更新数统计
    pub moves_per_tick: RunningStats,
}

impl TickStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(side: EngineSide) -> usize {
        match side {
            EngineSide::Traffic => 0,
            EngineSide::World => 1,
        }
    }

    /// 更新聚合统计
    pub fn update(&mut self, result: &StepResult, duration_ms: f64) {
        self.total_ticks += 1;

        for side in [EngineSide::Traffic, EngineSide::World] {
            self.spawns[Self::slot(side)] += result.spawns_for(side).count() as u64;
            self.destroys[Self::slot(side)] += result.destroys_for(side).count() as u64;
        }
        self.moves += result.move_requests.len() as u64;
        self.control_device_updates += result.control_device_updates.len() as u64;
        self.sensor_observations += result.sensor_observations.len() as u64;

        self.duration_stats.push(duration_ms);
        self.moves_per_tick.push(result.move_requests.len() as f64);
    }

    /// 记录失败的 tick
    pub fn record_failure(&mut self) {
        self.failed_ticks += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> TickSummary {
        TickSummary {
            total_ticks: self.total_ticks,
            failed_ticks: self.failed_ticks,
            world_spawns: self.spawns[Self::slot(EngineSide::World)],
            traffic_spawns: self.spawns[Self::slot(EngineSide::Traffic)],
            world_destroys: self.destroys[Self::slot(EngineSide::World)],
            traffic_destroys: self.destroys[Self::slot(EngineSide::Traffic)],
            moves: self.moves,
            control_device_updates: self.control_device_updates,
            sensor_observations: self.sensor_observations,
            tick_duration_ms: StatsSummary::from(&self.duration_stats),
            moves_per_tick: StatsSummary::from(&self.moves_per_tick),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub total_ticks: u64,
    pub failed_ticks: u64,
    pub world_spawns: u64,
    pub traffic_spawns: u64,
    pub world_destroys: u64,
    pub traffic_destroys: u64,
    pub moves: u64,
    pub control_device_updates: u64,
    pub sensor_observations: u64,
    pub tick_duration_ms: StatsSummary,
    pub moves_per_tick: StatsSummary,
}

impl std::fmt::Display for TickSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Co-simulation Summary ===")?;
        writeln!(f, "Ticks: {} ({} failed)", self.total_ticks, self.failed_ticks)?;
        writeln!(
            f,
            "Mirrors spawned: world={}, traffic={}",
            self.world_spawns, self.traffic_spawns
        )?;
        writeln!(
            f,
            "Mirrors destroyed: world={}, traffic={}",
            self.world_destroys, self.traffic_destroys
        )?;
        writeln!(f, "Move requests: {}", self.moves)?;
        writeln!(f, "Control-device updates: {}", self.control_device_updates)?;
        writeln!(f, "Sensor observations: {}", self.sensor_observations)?;
        writeln!(f, "Tick duration (ms): {}", self.tick_duration_ms)?;
        writeln!(f, "Moves per tick: {}", self.moves_per_tick)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        DestroyRequest, DevicePhase, MoveRequest, SpawnRequest, Transform, VehicleClass,
        ControlDeviceUpdate, WorldPhase,
    };

    fn sample_result() -> StepResult {
        StepResult {
            spawn_requests: vec![SpawnRequest {
                target: EngineSide::World,
                source_id: "v1".into(),
                entity_id: "1000".into(),
                type_id: "vehicle.audi.a2".into(),
                vehicle_class: VehicleClass::Passenger,
                route: None,
                color: None,
                transform: Transform::default(),
            }],
            destroy_requests: vec![DestroyRequest {
                target: EngineSide::Traffic,
                entity_id: "carla0".into(),
            }],
            move_requests: vec![
                MoveRequest {
                    target: EngineSide::World,
                    entity_id: "1000".into(),
                    transform: Transform::default(),
                    signals: None,
                },
                MoveRequest {
                    target: EngineSide::Traffic,
                    entity_id: "carla1".into(),
                    transform: Transform::default(),
                    signals: Some(0),
                },
            ],
            control_device_updates: vec![ControlDeviceUpdate {
                landmark_id: "tl_3".into(),
                phase: DevicePhase::World(WorldPhase::Red),
            }],
            sensor_observations: Vec::new(),
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();

        stats.push(1.0);
        stats.push(2.0);
        stats.push(3.0);
        stats.push(4.0);
        stats.push(5.0);

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = TickStatsAggregator::new();
        aggregator.update(&sample_result(), 1.5);
        aggregator.update(&StepResult::default(), 0.5);
        aggregator.record_failure();

        let summary = aggregator.summary();
        assert_eq!(summary.total_ticks, 2);
        assert_eq!(summary.failed_ticks, 1);
        assert_eq!(summary.world_spawns, 1);
        assert_eq!(summary.traffic_spawns, 0);
        assert_eq!(summary.traffic_destroys, 1);
        assert_eq!(summary.moves, 2);
        assert_eq!(summary.control_device_updates, 1);
        assert!((summary.tick_duration_ms.mean - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = TickStatsAggregator::new();
        aggregator.update(&sample_result(), 2.0);

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Ticks: 1 (0 failed)"));
        assert!(output.contains("world=1, traffic=0"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_step_metrics(&sample_result(), 1.0);
        record_mirror_count(EngineSide::World, 3);
        record_resolution_failure(EngineSide::Traffic);
        record_entity_race(EngineSide::World);
    }
}
