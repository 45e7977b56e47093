// Mirrors the externally managed database schema.

diesel::table! {
    recurring_event (id) {
        id -> Uuid,
        organization_id -> Uuid,
        name -> Text,
        description -> Nullable<Text>,
        location -> Nullable<Text>,
        start_at -> Nullable<Timestamptz>,
        end_at -> Nullable<Timestamptz>,
        all_day -> Bool,
        is_public -> Bool,
        is_registerable -> Bool,
        is_invite_only -> Bool,
        is_recurring -> Bool,
        creator_id -> Nullable<Uuid>,
        updater_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    recurrence_rule (id) {
        id -> Uuid,
        base_recurring_event_id -> Uuid,
        original_series_id -> Nullable<Uuid>,
        frequency -> Text,
        interval -> Int4,
        recurrence_start_date -> Timestamptz,
        recurrence_end_date -> Nullable<Timestamptz>,
        count -> Nullable<Int4>,
        by_day -> Array<Text>,
        by_month -> Array<Int4>,
        by_month_day -> Array<Int4>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    recurring_event_instance (id) {
        id -> Uuid,
        base_recurring_event_id -> Uuid,
        recurrence_rule_id -> Uuid,
        original_series_id -> Uuid,
        organization_id -> Uuid,
        original_instance_start_time -> Timestamptz,
        actual_start_time -> Timestamptz,
        actual_end_time -> Timestamptz,
        is_cancelled -> Bool,
        sequence_number -> Int4,
        total_count -> Nullable<Int4>,
        generated_at -> Timestamptz,
        last_updated_at -> Timestamptz,
        version -> Text,
    }
}

diesel::table! {
    recurring_event_exception (id) {
        id -> Uuid,
        recurring_event_instance_id -> Uuid,
        base_recurring_event_id -> Uuid,
        original_instance_start_time -> Timestamptz,
        organization_id -> Uuid,
        exception_data -> Jsonb,
        created_by_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    event_generation_window (id) {
        id -> Uuid,
        organization_id -> Uuid,
        hot_window_months_ahead -> Int4,
        history_retention_months -> Int4,
        current_window_end_date -> Timestamptz,
        retention_start_date -> Timestamptz,
        processing_priority -> Int4,
        max_instances_per_run -> Int4,
        is_enabled -> Bool,
        last_processed_at -> Nullable<Timestamptz>,
        last_processed_instance_count -> Int4,
        created_by_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(recurrence_rule -> recurring_event (base_recurring_event_id));
diesel::joinable!(recurring_event_instance -> recurring_event (base_recurring_event_id));
diesel::joinable!(recurring_event_instance -> recurrence_rule (recurrence_rule_id));
diesel::joinable!(recurring_event_exception -> recurring_event_instance (recurring_event_instance_id));

diesel::allow_tables_to_appear_in_same_query!(
    recurring_event,
    recurrence_rule,
    recurring_event_instance,
    recurring_event_exception,
    event_generation_window,
);
