mod helpers;

use chrono::{Duration, FixedOffset, NaiveTime};
use helpers::{at, day, setup, setup_with, RecordingNotifier, OWNER};
use nag_core::calendar::{Created, Updated};
use nag_core::error::CoreError;
use nag_core::escalation::{EscalationState, StaleReason, Transition};
use nag_core::models::{
    DeleteMode, DeleteRequest, NewTaskData, Recurrence, ReminderAction, Task, TaskStatus, UpdateTaskData,
};
use nag_core::notify::{CallbackEvent, MessageRef};
use nag_core::recurrence::VirtualId;
use nag_core::repository::{ExceptionRepository, TaskRepository, TemplateRepository};
use nag_core::triggers::{TriggerKey, TriggerKind, TriggerPayload, TriggerService};
use uuid::Uuid;

async fn one_off(env: &helpers::TestEnv, title: &str, due: &str, now: &str) -> Task {
    let data = NewTaskData {
        title: title.to_string(),
        remind_at: Some(at(due)),
        ..Default::default()
    };
    match env.calendar.create(OWNER, data, at(now)).await.unwrap() {
        Created::Task(task) => task,
        other => panic!("expected a task, got {:?}", other),
    }
}

fn callback(task_id: Uuid, action: ReminderAction) -> CallbackEvent {
    CallbackEvent {
        callback_id: "cb-1".to_string(),
        action,
        occurrence_id: task_id,
        from_user_id: OWNER.to_string(),
        message: Some(MessageRef {
            chat_id: OWNER.to_string(),
            message_id: 1,
        }),
    }
}

mod escalation_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_primary_chase_then_done() {
        let env = setup().await;
        let task = one_off(&env, "Drink water", "2024-05-13T10:00:00Z", "2024-05-13T09:00:00Z").await;
        assert_eq!(env.triggers.list_for(OWNER, task.id).await.unwrap().len(), 2);

        // Nothing is due yet.
        let early = env.dispatcher.run_due(at("2024-05-13T09:59:00Z")).await.unwrap();
        assert_eq!(early.total(), 0);

        let primary = env.dispatcher.run_due(at("2024-05-13T10:00:00Z")).await.unwrap();
        assert_eq!(primary.delivered, 1);
        {
            let sent = env.notifier.sent.lock().unwrap();
            assert_eq!(sent[0].text, "Time for Drink water! ⏰");
            assert_eq!(sent[0].chat_id, OWNER);
            assert_eq!(sent[0].buttons.len(), 3);
            assert_eq!(sent[0].buttons[1].callback_data, format!("SNOOZE:{}:60", task.id));
        }
        assert_eq!(
            env.machine.state(OWNER, task.id).await.unwrap(),
            Some(EscalationState::AwaitingAck)
        );

        let chase = env.dispatcher.run_due(at("2024-05-13T10:10:00Z")).await.unwrap();
        assert_eq!(chase.delivered, 1);
        assert!(env.notifier.texts()[1].starts_with("🚨 *URGENT*"));
        let rearmed = env.triggers.find(&TriggerKey::chase(OWNER, task.id)).await.unwrap().unwrap();
        assert_eq!(rearmed.fire_at, at("2024-05-13T10:20:00Z"));

        let transition = env
            .machine
            .on_callback(&callback(task.id, ReminderAction::Done), at("2024-05-13T10:12:00Z"))
            .await
            .unwrap();
        assert!(matches!(transition, Transition::Completed { .. }));
        assert_eq!(env.notifier.edits.lock().unwrap()[0].1, "✅ Completed: Drink water");
        assert_eq!(env.notifier.acks.lock().unwrap()[0].1, "Great job! 🔥");

        assert!(env.triggers.list_for(OWNER, task.id).await.unwrap().is_empty());
        let later = env.dispatcher.run_due(at("2024-05-13T11:00:00Z")).await.unwrap();
        assert_eq!(later.total(), 0);
        assert_eq!(env.notifier.texts().len(), 2);
    }

    #[tokio::test]
    async fn test_chase_keeps_going_until_answered() {
        let env = setup().await;
        let task = one_off(&env, "Call back", "2024-05-13T10:00:00Z", "2024-05-13T09:00:00Z").await;

        let mut now = at("2024-05-13T10:00:00Z");
        for _ in 0..6 {
            env.dispatcher.run_due(now).await.unwrap();
            now += Duration::minutes(10);
        }

        // One primary plus a chase every ten minutes.
        let texts = env.notifier.texts();
        assert_eq!(texts.len(), 6);
        assert_eq!(texts.iter().filter(|t| t.contains("URGENT")).count(), 5);
        assert!(env.triggers.find(&TriggerKey::chase(OWNER, task.id)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_snooze_replaces_both_triggers() {
        let env = setup().await;
        let task = one_off(&env, "Stretch", "2024-05-13T10:00:00Z", "2024-05-13T09:00:00Z").await;
        env.dispatcher.run_due(at("2024-05-13T10:00:00Z")).await.unwrap();

        let transition = env
            .machine
            .on_callback(
                &callback(task.id, ReminderAction::Snooze { minutes: 60 }),
                at("2024-05-13T10:05:00Z"),
            )
            .await
            .unwrap();
        let Transition::Rescheduled { task: snoozed, .. } = transition else {
            panic!("expected a reschedule");
        };
        assert_eq!(snoozed.remind_at, at("2024-05-13T11:05:00Z"));
        assert_eq!(snoozed.snooze_count, 1);
        assert_eq!(snoozed.status, TaskStatus::Snoozed);
        assert_eq!(env.notifier.edits.lock().unwrap()[0].1, "💤 Snoozed for 60m.");
        assert_eq!(env.notifier.acks.lock().unwrap()[0].1, "Snoozed.");

        let primary = env.triggers.find(&TriggerKey::primary(OWNER, task.id)).await.unwrap().unwrap();
        let chase = env.triggers.find(&TriggerKey::chase(OWNER, task.id)).await.unwrap().unwrap();
        assert_eq!(primary.fire_at, at("2024-05-13T11:05:00Z"));
        assert_eq!(chase.fire_at, at("2024-05-13T11:15:00Z"));

        // The old 10:10 chase is gone.
        let old_chase = env.dispatcher.run_due(at("2024-05-13T10:10:00Z")).await.unwrap();
        assert_eq!(old_chase.total(), 0);

        let renewed = env.dispatcher.run_due(at("2024-05-13T11:05:00Z")).await.unwrap();
        assert_eq!(renewed.delivered, 1);
        assert_eq!(env.notifier.texts().len(), 2);
    }

    #[tokio::test]
    async fn test_skip_moves_a_day_ahead() {
        let env = setup().await;
        let task = one_off(&env, "Journal", "2024-05-13T21:00:00Z", "2024-05-13T09:00:00Z").await;

        env.machine
            .on_callback(&callback(task.id, ReminderAction::Skip), at("2024-05-13T21:03:00Z"))
            .await
            .unwrap();

        let stored = env.repo.find_task(OWNER, task.id).await.unwrap().unwrap();
        assert_eq!(stored.remind_at, at("2024-05-14T21:03:00Z"));
        assert_eq!(stored.status, TaskStatus::Skipped);
        assert_eq!(stored.snooze_count, 1);
        assert_eq!(env.notifier.edits.lock().unwrap()[0].1, "⏭️ Skipped to tomorrow.");
    }

    #[tokio::test]
    async fn test_redelivered_primary_does_not_double_notify() {
        let env = setup().await;
        let task = one_off(&env, "Stretch", "2024-05-13T10:00:00Z", "2024-05-13T09:00:00Z").await;
        env.dispatcher.run_due(at("2024-05-13T10:00:00Z")).await.unwrap();

        // The timer service delivers the same firing again.
        let key = TriggerKey::primary(OWNER, task.id);
        let payload = TriggerPayload {
            owner_id: OWNER.to_string(),
            occurrence_id: task.id,
            title: task.title.clone(),
            kind: TriggerKind::Primary,
            scheduled_for: task.remind_at,
        };
        env.triggers.register(&key, task.remind_at, &payload).await.unwrap();

        let again = env.dispatcher.run_due(at("2024-05-13T10:01:00Z")).await.unwrap();
        assert_eq!(again.stale, 1);
        assert_eq!(env.notifier.texts().len(), 1);
        assert!(env.triggers.find(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_firings_for_deleted_task_are_dropped() {
        let env = setup().await;
        let task = one_off(&env, "Ghost", "2024-05-13T10:00:00Z", "2024-05-13T09:00:00Z").await;
        // Removed behind the scheduler's back, triggers still armed.
        env.repo.delete_task(OWNER, task.id).await.unwrap();

        let summary = env.dispatcher.run_due(at("2024-05-13T10:10:00Z")).await.unwrap();
        assert_eq!(summary.stale, 2);
        assert!(env.notifier.texts().is_empty());
        assert!(env.triggers.list_for(OWNER, task.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_done_twice_is_harmless() {
        let env = setup().await;
        let task = one_off(&env, "Meds", "2024-05-13T10:00:00Z", "2024-05-13T09:00:00Z").await;

        let first = env
            .machine
            .on_callback(&callback(task.id, ReminderAction::Done), at("2024-05-13T10:01:00Z"))
            .await
            .unwrap();
        let second = env
            .machine
            .on_callback(&callback(task.id, ReminderAction::Done), at("2024-05-13T10:02:00Z"))
            .await
            .unwrap();

        assert!(matches!(first, Transition::Completed { .. }));
        assert_eq!(second, Transition::Stale(StaleReason::Resolved));
        let stored = env.repo.find_task(OWNER, task.id).await.unwrap().unwrap();
        assert_eq!(stored.completed_at, Some(at("2024-05-13T10:01:00Z")));
        assert!(env.triggers.list_for(OWNER, task.id).await.unwrap().is_empty());
        assert_eq!(env.notifier.edits.lock().unwrap().len(), 1);
        assert_eq!(env.notifier.acks.lock().unwrap()[1].1, "Already handled.");
    }

    #[tokio::test]
    async fn test_unknown_callback_target() {
        let env = setup().await;
        let result = env
            .machine
            .on_callback(&callback(Uuid::now_v7(), ReminderAction::Done), at("2024-05-13T10:00:00Z"))
            .await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
        assert_eq!(env.notifier.acks.lock().unwrap()[0].1, "Task not found.");
    }

    #[tokio::test]
    async fn test_edit_failures_do_not_fail_the_action() {
        let notifier = RecordingNotifier {
            fail_edits: true,
            ..Default::default()
        };
        let env = setup_with(FixedOffset::east_opt(0).unwrap(), notifier).await;
        let task = one_off(&env, "Meds", "2024-05-13T10:00:00Z", "2024-05-13T09:00:00Z").await;

        let transition = env
            .machine
            .on_callback(&callback(task.id, ReminderAction::Done), at("2024-05-13T10:01:00Z"))
            .await
            .unwrap();
        assert!(matches!(transition, Transition::Completed { .. }));
        assert_eq!(env.notifier.acks.lock().unwrap().len(), 1);
    }
}

mod calendar_tests {
    use super::*;

    async fn template(env: &helpers::TestEnv, title: &str, first: &str, days: &str, now: &str) -> (Uuid, Option<Task>) {
        let data = NewTaskData {
            title: title.to_string(),
            remind_at: Some(at(first)),
            recurrence: Some(days.parse::<Recurrence>().unwrap()),
            ..Default::default()
        };
        match env.calendar.create(OWNER, data, at(now)).await.unwrap() {
            Created::Template { template, instance } => (template.id, instance),
            other => panic!("expected a template, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_template_creation_materializes_matching_first_day() {
        let env = setup().await;
        // 2024-05-13 is a Monday.
        let (template_id, instance) =
            template(&env, "Stretch", "2024-05-13T07:30:00Z", "MON,WED", "2024-05-13T06:00:00Z").await;

        let instance = instance.expect("Monday matches MON");
        assert_eq!(instance.from_template_id, Some(template_id));
        assert_eq!(instance.occurrence_date, Some(day("2024-05-13")));
        assert_eq!(env.triggers.list_for(OWNER, instance.id).await.unwrap().len(), 2);

        let monday = env.calendar.day_view(OWNER, day("2024-05-13"), at("2024-05-13T06:00:00Z")).await.unwrap();
        assert_eq!(monday.tasks.len(), 1);
        assert!(!monday.tasks[0].is_virtual);

        let tuesday = env.calendar.day_view(OWNER, day("2024-05-14"), at("2024-05-13T06:00:00Z")).await.unwrap();
        assert!(tuesday.tasks.is_empty());

        let wednesday = env.calendar.day_view(OWNER, day("2024-05-15"), at("2024-05-13T06:00:00Z")).await.unwrap();
        assert_eq!(wednesday.tasks.len(), 1);
        assert!(wednesday.tasks[0].is_virtual);
        assert_eq!(
            wednesday.tasks[0].task_id,
            VirtualId::new(template_id, day("2024-05-15")).to_string()
        );
        assert_eq!(wednesday.tasks[0].remind_at, at("2024-05-15T07:30:00Z"));
    }

    #[tokio::test]
    async fn test_template_time_is_kept_to_the_minute() {
        let env = setup().await;
        let (template_id, instance) =
            template(&env, "Stretch", "2024-05-13T07:30:42Z", "DAILY", "2024-05-13T06:00:00Z").await;

        let template = env.repo.find_template(OWNER, template_id).await.unwrap().unwrap();
        assert_eq!(template.time_of_day, NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        assert_eq!(instance.expect("daily").remind_at, at("2024-05-13T07:30:00Z"));

        let tuesday = env.calendar.day_view(OWNER, day("2024-05-14"), at("2024-05-13T06:00:00Z")).await.unwrap();
        assert_eq!(tuesday.tasks[0].remind_at, at("2024-05-14T07:30:00Z"));
    }

    #[tokio::test]
    async fn test_non_matching_first_day_creates_no_instance() {
        let env = setup().await;
        let (_, instance) = template(&env, "Gym", "2024-05-13T18:00:00Z", "TUE", "2024-05-13T06:00:00Z").await;
        assert!(instance.is_none());
        assert!(env.repo.find_tasks(OWNER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completing_virtual_materializes_once() {
        let env = setup().await;
        let (template_id, _) =
            template(&env, "Stretch", "2024-05-13T07:30:00Z", "MON,WED", "2024-05-13T06:00:00Z").await;
        let virtual_id = VirtualId::new(template_id, day("2024-05-15")).to_string();

        let update = UpdateTaskData {
            task_id: virtual_id.clone(),
            status: Some(TaskStatus::Done),
            ..Default::default()
        };
        let Updated::Task(done) = env.calendar.update(OWNER, update.clone(), at("2024-05-15T08:00:00Z")).await.unwrap()
        else {
            panic!("expected a task");
        };
        assert_eq!(done.status, TaskStatus::Done);
        assert_eq!(done.occurrence_date, Some(day("2024-05-15")));
        assert_eq!(done.completed_at, Some(at("2024-05-15T08:00:00Z")));

        // The dashboard retries with the same virtual id.
        let Updated::Task(again) = env.calendar.update(OWNER, update, at("2024-05-15T08:05:00Z")).await.unwrap() else {
            panic!("expected a task");
        };
        assert_eq!(again.id, done.id);
        assert_eq!(again.completed_at, done.completed_at);
        assert_eq!(env.repo.find_tasks(OWNER).await.unwrap().len(), 2);

        let view = env.calendar.day_view(OWNER, day("2024-05-15"), at("2024-05-15T08:05:00Z")).await.unwrap();
        assert_eq!(view.tasks.len(), 1);
        assert!(!view.tasks[0].is_virtual);
        assert_eq!(view.tasks[0].status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn test_single_delete_of_virtual_suppresses_it() {
        let env = setup().await;
        let (template_id, _) =
            template(&env, "Stretch", "2024-05-13T07:30:00Z", "DAILY", "2024-05-13T06:00:00Z").await;

        let request = DeleteRequest {
            task_id: VirtualId::new(template_id, day("2024-05-15")).to_string(),
            ..Default::default()
        };
        let outcome = env.calendar.delete(OWNER, request, at("2024-05-13T06:00:00Z")).await.unwrap();
        assert!(!outcome.deleted_task);
        assert!(outcome.suppressed.is_some());

        let view = env.calendar.day_view(OWNER, day("2024-05-15"), at("2024-05-13T06:00:00Z")).await.unwrap();
        assert!(view.tasks.is_empty());
        let planned = env.calendar.plan_day(OWNER, day("2024-05-15"), at("2024-05-15T00:00:00Z")).await.unwrap();
        assert!(planned.is_empty());

        // Neighbouring days are unaffected.
        let next = env.calendar.day_view(OWNER, day("2024-05-16"), at("2024-05-13T06:00:00Z")).await.unwrap();
        assert_eq!(next.tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_single_delete_of_instance_cancels_and_suppresses() {
        let env = setup().await;
        let (template_id, instance) =
            template(&env, "Stretch", "2024-05-13T07:30:00Z", "DAILY", "2024-05-13T06:00:00Z").await;
        let instance = instance.unwrap();

        let request = DeleteRequest {
            task_id: instance.id.to_string(),
            mode: DeleteMode::Single,
            ..Default::default()
        };
        let outcome = env.calendar.delete(OWNER, request, at("2024-05-13T06:30:00Z")).await.unwrap();
        assert!(outcome.deleted_task);
        assert_eq!(outcome.suppressed.unwrap().template_id, template_id);

        assert!(env.triggers.list_for(OWNER, instance.id).await.unwrap().is_empty());
        let view = env.calendar.day_view(OWNER, day("2024-05-13"), at("2024-05-13T06:30:00Z")).await.unwrap();
        assert!(view.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_template_and_date_suppress() {
        let env = setup().await;
        let (template_id, _) =
            template(&env, "Stretch", "2024-05-13T07:30:00Z", "DAILY", "2024-05-13T06:00:00Z").await;

        let request = DeleteRequest {
            task_id: VirtualId::new(template_id, day("2024-05-20")).to_string(),
            mode: DeleteMode::Single,
            date: Some(day("2024-05-20")),
            template_id: Some(template_id),
        };
        env.calendar.delete(OWNER, request.clone(), at("2024-05-13T06:00:00Z")).await.unwrap();
        env.calendar.delete(OWNER, request, at("2024-05-13T06:01:00Z")).await.unwrap();

        assert_eq!(env.repo.find_exceptions(OWNER).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_series_delete_keeps_past_instances() {
        let env = setup().await;
        let (template_id, instance) =
            template(&env, "Stretch", "2024-05-13T07:30:00Z", "DAILY", "2024-05-13T06:00:00Z").await;

        let request = DeleteRequest {
            task_id: template_id.to_string(),
            mode: DeleteMode::Series,
            ..Default::default()
        };
        let outcome = env.calendar.delete(OWNER, request, at("2024-05-13T06:00:00Z")).await.unwrap();
        assert!(outcome.deleted_template);

        let view = env.calendar.day_view(OWNER, day("2024-05-20"), at("2024-05-13T06:00:00Z")).await.unwrap();
        assert!(view.tasks.is_empty());
        let remaining = env.repo.find_tasks(OWNER).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, instance.unwrap().id);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let env = setup().await;
        let request = DeleteRequest {
            task_id: Uuid::now_v7().to_string(),
            ..Default::default()
        };
        let result = env.calendar.delete(OWNER, request, at("2024-05-13T06:00:00Z")).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_plan_day_is_idempotent_and_skips_past_scheduling() {
        let env = setup().await;
        template(&env, "Meds", "2024-05-13T09:00:00Z", "DAILY", "2024-05-13T06:00:00Z").await;

        let planned = env.calendar.plan_day(OWNER, day("2024-05-14"), at("2024-05-14T00:05:00Z")).await.unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(env.triggers.list_for(OWNER, planned[0].id).await.unwrap().len(), 2);

        let again = env.calendar.plan_day(OWNER, day("2024-05-14"), at("2024-05-14T00:06:00Z")).await.unwrap();
        assert!(again.is_empty());

        // Started late: the 09:00 instance exists but is not fired retroactively.
        let late = env.calendar.plan_day(OWNER, day("2024-05-15"), at("2024-05-15T10:00:00Z")).await.unwrap();
        assert_eq!(late.len(), 1);
        assert!(env.triggers.list_for(OWNER, late[0].id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_moving_due_time_reschedules() {
        let env = setup().await;
        let task = one_off(&env, "Dentist", "2024-05-13T10:00:00Z", "2024-05-13T09:00:00Z").await;

        let update = UpdateTaskData {
            task_id: task.id.to_string(),
            remind_at: Some(at("2024-05-13T12:00:00Z")),
            title: Some("Dentist (moved)".to_string()),
            ..Default::default()
        };
        env.calendar.update(OWNER, update, at("2024-05-13T09:30:00Z")).await.unwrap();

        let armed = env.triggers.list_for(OWNER, task.id).await.unwrap();
        let fire_times: Vec<_> = armed.iter().map(|t| t.fire_at).collect();
        assert_eq!(fire_times, vec![at("2024-05-13T12:00:00Z"), at("2024-05-13T12:10:00Z")]);

        env.dispatcher.run_due(at("2024-05-13T12:00:00Z")).await.unwrap();
        assert_eq!(env.notifier.texts(), vec!["Time for Dentist (moved)! ⏰"]);
    }

    #[tokio::test]
    async fn test_moving_due_time_into_the_past_replaces_old_triggers() {
        let env = setup().await;
        let task = one_off(&env, "Call mum", "2024-05-13T15:00:00Z", "2024-05-13T09:00:00Z").await;

        let update = UpdateTaskData {
            task_id: task.id.to_string(),
            remind_at: Some(at("2024-05-13T09:00:00Z")),
            ..Default::default()
        };
        env.calendar.update(OWNER, update, at("2024-05-13T10:00:00Z")).await.unwrap();

        let armed: Vec<_> = env
            .triggers
            .list_for(OWNER, task.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| (t.payload.kind, t.fire_at))
            .collect();
        assert_eq!(
            armed,
            vec![
                (TriggerKind::Primary, at("2024-05-13T09:00:00Z")),
                (TriggerKind::Chase, at("2024-05-13T09:10:00Z")),
            ]
        );

        // The overdue cycle fires on the next pass; nothing is left at 15:10.
        let summary = env.dispatcher.run_due(at("2024-05-13T10:00:00Z")).await.unwrap();
        assert_eq!(summary.delivered, 2);
        assert_eq!(env.notifier.texts()[0], "Time for Call mum! ⏰");
        let chase = env.triggers.find(&TriggerKey::chase(OWNER, task.id)).await.unwrap().unwrap();
        assert_eq!(chase.fire_at, at("2024-05-13T10:10:00Z"));
    }

    #[tokio::test]
    async fn test_template_edit_keeps_exceptions() {
        let env = setup().await;
        let (template_id, _) =
            template(&env, "Stretch", "2024-05-13T07:30:00Z", "DAILY", "2024-05-13T06:00:00Z").await;
        env.repo
            .suppress(OWNER, template_id, day("2024-05-14"), at("2024-05-13T06:00:00Z"))
            .await
            .unwrap();

        let update = UpdateTaskData {
            task_id: template_id.to_string(),
            remind_at: Some(at("2024-05-13T08:15:00Z")),
            recurrence: Some(Recurrence::daily()),
            ..Default::default()
        };
        let Updated::Template(edited) = env.calendar.update(OWNER, update, at("2024-05-13T06:10:00Z")).await.unwrap()
        else {
            panic!("expected a template");
        };
        assert_eq!(edited.time_of_day, NaiveTime::from_hms_opt(8, 15, 0).unwrap());

        let suppressed = env.calendar.day_view(OWNER, day("2024-05-14"), at("2024-05-13T06:10:00Z")).await.unwrap();
        assert!(suppressed.tasks.is_empty());
        let open = env.calendar.day_view(OWNER, day("2024-05-15"), at("2024-05-13T06:10:00Z")).await.unwrap();
        assert_eq!(open.tasks[0].remind_at, at("2024-05-15T08:15:00Z"));
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let env = setup().await;
        let blank = NewTaskData {
            title: "  ".to_string(),
            remind_at: Some(at("2024-05-13T10:00:00Z")),
            ..Default::default()
        };
        assert!(matches!(
            env.calendar.create(OWNER, blank, at("2024-05-13T09:00:00Z")).await,
            Err(CoreError::Validation(_))
        ));

        let no_time = NewTaskData {
            title: "Something".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            env.calendar.create(OWNER, no_time, at("2024-05-13T09:00:00Z")).await,
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_owner_offset_applies_to_templates() {
        let offset = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let env = setup_with(offset, RecordingNotifier::default()).await;
        // 09:00 on Monday 2024-05-13 at +05:30.
        let (_, instance) =
            template(&env, "Standup", "2024-05-13T03:30:00Z", "MON", "2024-05-13T00:00:00Z").await;

        let instance = instance.unwrap();
        assert_eq!(instance.occurrence_date, Some(day("2024-05-13")));
        assert_eq!(instance.remind_at, at("2024-05-13T03:30:00Z"));

        let next = env.calendar.day_view(OWNER, day("2024-05-20"), at("2024-05-13T00:00:00Z")).await.unwrap();
        assert_eq!(next.tasks[0].remind_at, at("2024-05-20T03:30:00Z"));
    }
}

mod stats_tests {
    use super::*;

    #[tokio::test]
    async fn test_day_view_reports_streak_and_heatmap() {
        let env = setup().await;
        for (due, done) in [
            ("2024-05-10T09:00:00Z", "2024-05-10T09:05:00Z"),
            ("2024-05-11T09:00:00Z", "2024-05-11T09:05:00Z"),
            ("2024-05-12T09:00:00Z", "2024-05-12T09:05:00Z"),
            ("2024-05-12T18:00:00Z", "2024-05-12T18:30:00Z"),
        ] {
            let task = one_off(&env, "Habit", due, "2024-05-10T00:00:00Z").await;
            env.machine.apply(OWNER, task.id, ReminderAction::Done, at(done)).await.unwrap();
        }

        let view = env.calendar.day_view(OWNER, day("2024-05-13"), at("2024-05-13T08:00:00Z")).await.unwrap();
        assert_eq!(view.streak, 3);
        assert_eq!(
            serde_json::to_value(&view.heatmap).unwrap(),
            serde_json::json!({"2024-05-10": 1, "2024-05-11": 1, "2024-05-12": 2})
        );

        let broken = env.calendar.day_view(OWNER, day("2024-05-14"), at("2024-05-14T08:00:00Z")).await.unwrap();
        assert_eq!(broken.streak, 0);
    }

    #[tokio::test]
    async fn test_weekly_report() {
        let env = setup().await;
        let done = one_off(&env, "Run", "2024-05-11T07:00:00Z", "2024-05-10T00:00:00Z").await;
        one_off(&env, "Read", "2024-05-12T20:00:00Z", "2024-05-10T00:00:00Z").await;
        env.machine
            .apply(OWNER, done.id, ReminderAction::Done, at("2024-05-11T07:10:00Z"))
            .await
            .unwrap();

        let report = env.calendar.weekly_report(OWNER, at("2024-05-13T08:00:00Z")).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(report.completion_rate, 50);
        assert!(report.render().contains("*Best Day*: Saturday"));
        assert!(report.render().contains("Good progress!"));
    }
}
