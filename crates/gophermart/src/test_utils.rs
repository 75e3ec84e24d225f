//! 测试辅助
//!
//! `ScriptedScorer` 按订单号预设积分系统的应答序列，供集成测试驱动对账流程。

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::accrual::{AccrualReply, AccrualScorer, ScorerError};

type Step = Result<AccrualReply, ScorerError>;

#[derive(Default)]
struct Script {
    steps: HashMap<String, VecDeque<Step>>,
    calls: Vec<String>,
}

/// 按脚本应答的积分系统
///
/// 每个订单号的应答依次出队，最后一步会一直重复。
/// 没有脚本的订单号返回 `NotFound`。
#[derive(Default)]
pub struct ScriptedScorer {
    script: Mutex<Script>,
}

impl ScriptedScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为订单号追加一步应答
    pub fn push(&self, number: &str, step: Step) -> &Self {
        self.script
            .lock()
            .steps
            .entry(number.to_string())
            .or_default()
            .push_back(step);
        self
    }

    /// 已收到的查询（按调用顺序）
    pub fn calls(&self) -> Vec<String> {
        self.script.lock().calls.clone()
    }

    /// 某订单号被查询的次数
    pub fn call_count(&self, number: &str) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|n| n.as_str() == number)
            .count()
    }
}

#[async_trait]
impl AccrualScorer for ScriptedScorer {
    async fn query(&self, number: &str) -> Result<AccrualReply, ScorerError> {
        let mut script = self.script.lock();
        script.calls.push(number.to_string());

        let Some(queue) = script.steps.get_mut(number) else {
            return Err(ScorerError::NotFound);
        };
        match queue.len() {
            0 => Err(ScorerError::NotFound),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap_or(Err(ScorerError::NotFound)),
        }
    }
}
